//! Study configuration loader.
//!
//! Pipeline: read the file (size-checked), parse as YAML (JSON is a
//! subset), deserialize into the typed schema, validate the references,
//! freeze with `Arc`. The frozen config is shared read-only across the
//! batch workers.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use tracing::debug;

use crate::config::schema::StudyConfig;
use crate::error::{ConfigError, Severity, ValidationIssue};
use crate::replay::level::LevelKind;
use crate::replay::phase::PHASES_WITH_LEVELS;

/// Maximum configuration file size in bytes.
pub const MAX_CONFIG_SIZE: u64 = 10 * 1024 * 1024;

/// Phase names the replay engine knows how to drive.
const KNOWN_PHASES: &[&str] = &[
    "GameIntro",
    "GameIntroND",
    "IntroduceElements",
    "IntroduceDrawingTools",
    "Quali",
    "Competition",
    "Skill",
    "FinalScene",
    "FinalSceneNPS",
];

/// Result of loading a configuration file.
#[derive(Debug)]
pub struct LoadResult {
    /// The loaded and validated configuration
    pub config: Arc<StudyConfig>,

    /// Non-fatal issues encountered during validation
    pub warnings: Vec<ValidationIssue>,
}

/// Loads, validates and freezes a study configuration.
///
/// # Errors
///
/// Returns a config error when the file is missing or oversized, does
/// not parse, or fails reference validation.
pub fn load_config(path: &Path) -> Result<LoadResult, ConfigError> {
    let metadata = fs::metadata(path).map_err(|_| ConfigError::MissingFile {
        path: path.to_path_buf(),
    })?;
    if metadata.len() > MAX_CONFIG_SIZE {
        return Err(ConfigError::TooLarge {
            size: metadata.len(),
            limit: MAX_CONFIG_SIZE,
        });
    }

    let raw = fs::read_to_string(path).map_err(|e| ConfigError::ParseError {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;

    let config: StudyConfig =
        serde_yaml::from_str(&raw).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;

    let issues = validate(&config);
    let (errors, warnings): (Vec<_>, Vec<_>) = issues
        .into_iter()
        .partition(|issue| issue.severity == Severity::Error);

    if !errors.is_empty() {
        return Err(ConfigError::ValidationError {
            path: path.display().to_string(),
            errors,
        });
    }

    debug!(
        groups = config.groups.len(),
        pools = config.level_lists.len(),
        "loaded study configuration"
    );

    Ok(LoadResult {
        config: Arc::new(config),
        warnings,
    })
}

/// Validates cross-references within a study configuration.
#[must_use]
pub fn validate(config: &StudyConfig) -> Vec<ValidationIssue> {
    let mut issues = Vec::new();

    if config.groups.is_empty() {
        issues.push(ValidationIssue {
            path: "groups".to_string(),
            message: "no groups configured".to_string(),
            severity: Severity::Error,
        });
    }

    for (group_name, group) in &config.groups {
        for (idx, phase) in group.phases.iter().enumerate() {
            if !KNOWN_PHASES.contains(&phase.as_str()) {
                issues.push(ValidationIssue {
                    path: format!("groups.{group_name}.phases[{idx}]"),
                    message: format!("unknown phase '{phase}'"),
                    severity: Severity::Warning,
                });
            }

            // Level phases must resolve their pools
            if PHASES_WITH_LEVELS.contains(&phase.as_str()) {
                let Some(settings) = group.phase_settings.get(phase) else {
                    issues.push(ValidationIssue {
                        path: format!("groups.{group_name}.{phase}"),
                        message: "level phase without settings".to_string(),
                        severity: Severity::Error,
                    });
                    continue;
                };

                let mut pool_count = 0;
                for pool in settings.pools.iter() {
                    pool_count += 1;
                    if !config.level_lists.contains_key(pool) {
                        issues.push(ValidationIssue {
                            path: format!("groups.{group_name}.{phase}.pools"),
                            message: format!("unknown level pool '{pool}'"),
                            severity: Severity::Error,
                        });
                    }
                }
                if pool_count == 0 {
                    issues.push(ValidationIssue {
                        path: format!("groups.{group_name}.{phase}.pools"),
                        message: "level phase without pools".to_string(),
                        severity: Severity::Error,
                    });
                }
            }
        }
    }

    for (pool_name, pool) in &config.level_lists {
        if pool.levels.is_empty() {
            issues.push(ValidationIssue {
                path: format!("levelLists.{pool_name}.levels"),
                message: "empty level pool".to_string(),
                severity: Severity::Warning,
            });
        }

        for (idx, slot) in pool.levels.iter().enumerate() {
            let entries: Vec<_> = match slot {
                crate::config::schema::LevelSlot::Single(entry) => vec![entry],
                crate::config::schema::LevelSlot::Group(entries) => entries.iter().collect(),
            };
            for entry in entries {
                if LevelKind::from_config(&entry.kind).is_err() {
                    issues.push(ValidationIssue {
                        path: format!("levelLists.{pool_name}.levels[{idx}]"),
                        message: format!("unknown level type '{}'", entry.kind),
                        severity: Severity::Error,
                    });
                }
            }
        }
    }

    issues
}
