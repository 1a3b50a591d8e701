//! Typed study configuration.
//!
//! Mirrors the game configuration the study server was run with: groups
//! map to an ordered phase outline plus per-phase settings, and the
//! level-bearing phases reference named level pools. The replay needs
//! the same configuration to reconstruct the expected level list for
//! every participant.

use indexmap::IndexMap;
use serde::Deserialize;

use crate::error::ReplayError;

/// Root of the study configuration (YAML or JSON).
#[derive(Debug, Clone, Deserialize)]
pub struct StudyConfig {
    /// Group name → phase outline and settings. Group names are matched
    /// case-insensitively against the log.
    pub groups: IndexMap<String, GroupConfig>,

    /// Named level pools referenced by the phase settings.
    #[serde(rename = "levelLists", default)]
    pub level_lists: IndexMap<String, LevelList>,
}

impl StudyConfig {
    /// Looks up a group by its lowercased name.
    #[must_use]
    pub fn group(&self, name: &str) -> Option<&GroupConfig> {
        self.groups
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, group)| group)
    }

    /// The full list of `(type, name)` slides that can show up during a
    /// phase, in pool order. Pools may hold alternatives (shuffling,
    /// pick-one groups); the replay matches the actually delivered
    /// slides against this superset.
    ///
    /// # Errors
    ///
    /// Returns a syntax error if the phase has no pool settings or a
    /// pool reference is dangling.
    pub fn possible_levels(
        &self,
        group: &GroupConfig,
        phase: &str,
    ) -> Result<Vec<(String, String)>, ReplayError> {
        let Some(settings) = group.phase_settings.get(phase) else {
            return Err(ReplayError::syntax(format!(
                "error while accessing config: no settings for phase {phase}"
            )));
        };

        let mut levels = Vec::new();
        for pool_name in settings.pools.iter() {
            let Some(pool) = self.level_lists.get(pool_name) else {
                return Err(ReplayError::syntax(format!(
                    "error while accessing config: unknown level pool {pool_name}"
                )));
            };

            for slot in &pool.levels {
                match slot {
                    LevelSlot::Single(entry) => {
                        levels.push((entry.kind.clone(), entry.name.clone()));
                    }
                    LevelSlot::Group(entries) => {
                        for entry in entries {
                            levels.push((entry.kind.clone(), entry.name.clone()));
                        }
                    }
                }
            }
        }
        Ok(levels)
    }
}

/// Configuration of one study group.
#[derive(Debug, Clone, Deserialize)]
pub struct GroupConfig {
    /// Ordered phase outline for this group
    pub phases: Vec<String>,

    /// Per-phase settings, keyed by phase name
    #[serde(flatten)]
    pub phase_settings: IndexMap<String, PhaseSettings>,
}

/// Settings of a single phase within a group.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PhaseSettings {
    /// Level pools feeding this phase, a single name or a list
    #[serde(default)]
    pub pools: Pools,

    /// Think-aloud mode (`concurrent` or `retrospective`)
    #[serde(default)]
    pub thinkaloud: Option<String>,

    /// Whether guided tutorial circuits are inserted automatically
    #[serde(default, rename = "insertTutorials")]
    pub insert_tutorials: Option<bool>,
}

/// One pool name or a list of pool names.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum Pools {
    One(String),
    Many(Vec<String>),
}

impl Default for Pools {
    fn default() -> Self {
        Self::Many(Vec::new())
    }
}

impl Pools {
    /// Iterates over the referenced pool names.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        match self {
            Self::One(name) => std::slice::from_ref(name).iter(),
            Self::Many(names) => names.iter(),
        }
        .map(String::as_str)
    }
}

/// A named pool of level slides.
#[derive(Debug, Clone, Deserialize)]
pub struct LevelList {
    /// Slides in outline order; nested lists are pick-one groups
    pub levels: Vec<LevelSlot>,

    /// Whether the server shuffles this pool per participant
    #[serde(default)]
    pub shuffle: bool,

    /// How many slides the server draws from the pool
    #[serde(default)]
    pub amount: Option<Amount>,
}

/// A slide or a pick-one group of slide variants.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum LevelSlot {
    Single(LevelEntry),
    Group(Vec<LevelEntry>),
}

/// One slide in a level pool.
#[derive(Debug, Clone, Deserialize)]
pub struct LevelEntry {
    /// Config-side slide type (`level`, `info`, `tutorial`, ...)
    #[serde(rename = "type")]
    pub kind: String,

    /// Level file name, e.g. `medium/and4`
    pub name: String,

    /// Variant group tag, only inside pick-one groups
    #[serde(default)]
    pub group: Option<String>,
}

/// Draw count of a level pool.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum Amount {
    /// Draw a fixed number of slides
    Count(u32),
    /// Draw one slide per named variant group, or the literal `all`
    Names(Vec<String>),
    /// `all`
    All(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> StudyConfig {
        let yaml = r#"
groups:
  alpha:
    phases: [GameIntro, Quali, FinalScene]
    Quali:
      pools: [intro, circuits]
  beta:
    phases: [GameIntro, FinalScene]
levelLists:
  intro:
    levels:
      - { type: info, name: welcome }
  circuits:
    shuffle: true
    amount: 2
    levels:
      - { type: level, name: easy/and1 }
      - - { type: level, name: medium/and4, group: a }
        - { type: level, name: high/and8, group: b }
"#;
        serde_yaml::from_str(yaml).unwrap()
    }

    #[test]
    fn test_group_lookup_is_case_insensitive() {
        let config = config();
        assert!(config.group("Alpha").is_some());
        assert!(config.group("ALPHA").is_some());
        assert!(config.group("gamma").is_none());
    }

    #[test]
    fn test_possible_levels_flattens_pools_and_groups() {
        let config = config();
        let group = config.group("alpha").unwrap();
        let levels = config.possible_levels(group, "Quali").unwrap();
        let names: Vec<&str> = levels.iter().map(|(_, name)| name.as_str()).collect();
        assert_eq!(names, vec!["welcome", "easy/and1", "medium/and4", "high/and8"]);
    }

    #[test]
    fn test_missing_phase_settings_is_an_error() {
        let config = config();
        let group = config.group("beta").unwrap();
        assert!(config.possible_levels(group, "Quali").is_err());
    }

    #[test]
    fn test_single_pool_shorthand() {
        let yaml = r#"
groups:
  alpha:
    phases: [Quali]
    Quali:
      pools: intro
levelLists:
  intro:
    levels:
      - { type: info, name: welcome }
"#;
        let config: StudyConfig = serde_yaml::from_str(yaml).unwrap();
        let group = config.group("alpha").unwrap();
        let levels = config.possible_levels(group, "Quali").unwrap();
        assert_eq!(levels.len(), 1);
    }

    #[test]
    fn test_json_config_parses_too() {
        let json = r#"{
  "groups": {"alpha": {"phases": ["Quali"], "Quali": {"pools": "intro"}}},
  "levelLists": {"intro": {"levels": [{"type": "info", "name": "welcome"}]}}
}"#;
        let config: StudyConfig = serde_yaml::from_str(json).unwrap();
        assert!(config.group("alpha").is_some());
    }
}
