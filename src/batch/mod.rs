//! Batch processing of a directory of participant logs.
//!
//! Each `logFile_*.txt` is parsed, sequenced and replayed on its own
//! blocking worker; a single merge step buckets the outcomes. The study
//! configuration is shared read-only behind an `Arc`, the logfile
//! version histogram is accumulated in a `DashMap` across workers.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use dashmap::DashMap;
use indexmap::IndexMap;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::config::StudyConfig;
use crate::error::{FilterReason, LogSyntaxError, ReplayError, StudylogError};
use crate::parser::parse_log;
use crate::replay::{self, Participant};
use crate::sequencer::{DEFAULT_DRIFT_THRESHOLD_SECS, Sequencer, short_pseudo};

/// Logs below this record count never left the preload scene (crawler
/// visits, accidental tab opens) and are dropped silently.
pub const MIN_EVENT_COUNT: usize = 5;

/// Logfiles above this size are rejected before parsing.
pub const MAX_LOGFILE_SIZE: u64 = 20 * 1024 * 1024;

/// Options for one batch run.
#[derive(Debug, Clone)]
pub struct BatchOptions {
    /// Directory holding the `logFile_*.txt` files
    pub log_dir: PathBuf,

    /// Allow-list of groups; empty selects every group
    pub groups: Vec<String>,

    /// Keep participants from `debug*` groups
    pub allow_debug: bool,

    /// Client/server drift threshold in seconds
    pub sync_threshold_secs: f64,

    /// Pseudonyms whose failure reasons are reported verbatim
    pub vip: Vec<String>,

    /// Per-file size limit in bytes
    pub max_file_size: u64,

    /// Maximum number of concurrently processed logs; `None` leaves the
    /// limit to the blocking thread pool
    pub jobs: Option<usize>,
}

impl BatchOptions {
    #[must_use]
    pub fn new(log_dir: impl Into<PathBuf>) -> Self {
        Self {
            log_dir: log_dir.into(),
            groups: Vec::new(),
            allow_debug: false,
            sync_threshold_secs: DEFAULT_DRIFT_THRESHOLD_SECS,
            vip: Vec::new(),
            max_file_size: MAX_LOGFILE_SIZE,
            jobs: None,
        }
    }
}

/// A syntactically invalid log, with its origin recorded.
#[derive(Debug)]
pub struct ErroredLog {
    pub pseudonym: String,
    pub version: String,
    pub error: LogSyntaxError,
}

/// Merged outcome of a batch run.
#[derive(Debug, Default)]
pub struct BatchReport {
    /// Successfully replayed participants, in directory order
    pub participants: Vec<Participant>,

    /// Logs dropped by the group/debug filters
    pub filtered: Vec<(String, FilterReason)>,

    /// Logs that failed validation
    pub errored: Vec<ErroredLog>,

    /// Engine defects: `(pseudonym, message)`. Any entry here makes the
    /// whole run fail.
    pub internal: Vec<(String, String)>,

    /// Logs too small to contain a game session
    pub empty: usize,

    /// Logfile format version histogram
    pub versions: IndexMap<String, usize>,

    /// Failure reasons of the requested VIP logs
    pub vip_errors: IndexMap<String, String>,
}

impl BatchReport {
    /// One-line bucket summary.
    #[must_use]
    pub fn summary(&self) -> String {
        format!(
            "{} logs processed: {} output, {} filtered, {} errored, {} internal, {} empty",
            self.participants.len()
                + self.filtered.len()
                + self.errored.len()
                + self.internal.len()
                + self.empty,
            self.participants.len(),
            self.filtered.len(),
            self.errored.len(),
            self.internal.len(),
            self.empty
        )
    }

    /// Reconnect legend: every participant that reloaded the page
    /// mid-game, with the positions of the reloads.
    #[must_use]
    pub fn render_reconnects(&self) -> Option<String> {
        let mut lines = Vec::new();
        for participant in &self.participants {
            let positions: Vec<&str> = participant
                .reconnects
                .iter()
                .filter(|position| position.as_str() != "Start")
                .map(String::as_str)
                .collect();
            if positions.is_empty() {
                continue;
            }
            lines.push(format!(
                "{}: {}",
                short_pseudo(&participant.pseudonym),
                positions.join(", ")
            ));
        }
        if lines.is_empty() {
            return None;
        }
        Some(format!(" --- Reconnects --- \n{}", lines.join("\n")))
    }

    /// High-drift report: participants whose client clock drifted
    /// critically against the server.
    #[must_use]
    pub fn render_drifts(&self) -> Option<String> {
        let mut lines = Vec::new();
        for participant in &self.participants {
            let drifts = &participant.critical_time_drifts;
            if drifts.is_empty() {
                continue;
            }
            let sum: f64 = drifts.iter().sum();
            let abs_sum: f64 = drifts.iter().map(|d| d.abs()).sum();
            lines.push(format!(
                "{}: Count {}, Sum {:.1}s, AbsSum {:.1}s",
                short_pseudo(&participant.pseudonym),
                drifts.len(),
                sum,
                abs_sum
            ));
        }
        if lines.is_empty() {
            return None;
        }
        Some(format!(" --- High Time drifts --- \n{}", lines.join("\n")))
    }

    /// Verbatim failure reasons of the requested VIP logs.
    #[must_use]
    pub fn render_vip(&self) -> Option<String> {
        if self.vip_errors.is_empty() {
            return None;
        }
        let lines: Vec<String> = self
            .vip_errors
            .iter()
            .map(|(pseudonym, reason)| format!("{pseudonym}: {reason}"))
            .collect();
        Some(format!(
            " --- VIP Logs with errors --- \n{}",
            lines.join("\n")
        ))
    }

    /// True if the engine itself broke on any log.
    #[must_use]
    pub fn has_internal_errors(&self) -> bool {
        !self.internal.is_empty()
    }
}

/// Outcome of one worker, before bucketing.
#[derive(Debug)]
struct FileOutcome {
    pseudonym: String,
    version: String,
    result: LogResult,
}

#[derive(Debug)]
enum LogResult {
    Output(Box<Participant>),
    Filtered(FilterReason),
    Errored(LogSyntaxError),
    Internal(String),
}

/// Replays every `logFile_*.txt` under the configured directory.
///
/// # Errors
///
/// Returns an I/O error when the log directory cannot be read. Per-log
/// failures never abort the batch; they end up in their report bucket.
pub async fn run_batch(
    config: Arc<StudyConfig>,
    options: BatchOptions,
) -> Result<BatchReport, StudylogError> {
    let mut names: Vec<String> = Vec::new();
    for entry in fs::read_dir(&options.log_dir)? {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().into_owned();
        if name.starts_with("logFile_") && name.ends_with(".txt") {
            names.push(name);
        } else {
            debug!(file = %name, "skipping non-log file");
        }
    }
    names.sort();
    info!(logs = names.len(), dir = %options.log_dir.display(), "starting batch run");

    let versions: Arc<DashMap<String, usize>> = Arc::new(DashMap::new());
    let options = Arc::new(options);
    let limiter = options
        .jobs
        .map(|jobs| Arc::new(Semaphore::new(jobs.max(1))));

    let mut workers = JoinSet::new();
    for (index, name) in names.into_iter().enumerate() {
        let config = Arc::clone(&config);
        let options = Arc::clone(&options);
        let versions = Arc::clone(&versions);
        let limiter = limiter.clone();

        workers.spawn(async move {
            let _permit = match &limiter {
                Some(semaphore) => Some(
                    Arc::clone(semaphore)
                        .acquire_owned()
                        .await
                        .expect("batch semaphore closed"),
                ),
                None => None,
            };
            let outcome = tokio::task::spawn_blocking(move || {
                let path = options.log_dir.join(&name);
                let outcome = process_log(&config, &path, &name, &options);
                // Logs that broke before their head was read have no version
                if !outcome.version.is_empty() {
                    *versions.entry(outcome.version.clone()).or_insert(0) += 1;
                }
                outcome
            })
            .await
            .expect("batch worker panicked");
            (index, outcome)
        });
    }

    let mut outcomes: Vec<(usize, FileOutcome)> = Vec::new();
    while let Some(joined) = workers.join_next().await {
        outcomes.push(joined.expect("batch worker panicked"));
    }
    outcomes.sort_by_key(|(index, _)| *index);

    let mut report = BatchReport::default();
    for (_, outcome) in outcomes {
        merge_outcome(&mut report, outcome, &options.vip);
    }

    let mut versions: Vec<(String, usize)> = Arc::try_unwrap(versions)
        .map_or_else(
            |shared| shared.iter().map(|e| (e.key().clone(), *e.value())).collect(),
            |owned| owned.into_iter().collect(),
        );
    versions.sort();
    report.versions = versions.into_iter().collect();

    info!("{}", report.summary());
    Ok(report)
}

fn merge_outcome(report: &mut BatchReport, outcome: FileOutcome, vip: &[String]) {
    let FileOutcome {
        pseudonym,
        version,
        result,
    } = outcome;
    let is_vip = vip.iter().any(|name| *name == pseudonym);

    match result {
        LogResult::Output(participant) => report.participants.push(*participant),
        LogResult::Filtered(FilterReason::TooFewEvents { .. }) => report.empty += 1,
        LogResult::Filtered(reason) => {
            debug!(pseudonym = %short_pseudo(&pseudonym), %reason, "log filtered");
            if is_vip {
                report.vip_errors.insert(pseudonym.clone(), reason.to_string());
            }
            report.filtered.push((pseudonym, reason));
        }
        LogResult::Errored(error) => {
            match error.line {
                Some(line) => warn!(
                    "Validation of {} failed (v{version}, ln. {line}): {}",
                    short_pseudo(&pseudonym),
                    error.message
                ),
                None => warn!(
                    "Validation of {} failed (v{version}): {}",
                    short_pseudo(&pseudonym),
                    error.message
                ),
            }
            if is_vip {
                report.vip_errors.insert(pseudonym.clone(), error.to_string());
            }
            report.errored.push(ErroredLog {
                pseudonym,
                version,
                error,
            });
        }
        LogResult::Internal(message) => {
            warn!(
                "Replay of {} hit an internal error (v{version}): {message}",
                short_pseudo(&pseudonym)
            );
            if is_vip {
                report.vip_errors.insert(pseudonym.clone(), message.clone());
            }
            report.internal.push((pseudonym, message));
        }
    }
}

/// Parses, filters, sequences and replays a single log file.
fn process_log(
    config: &Arc<StudyConfig>,
    path: &Path,
    file_name: &str,
    options: &BatchOptions,
) -> FileOutcome {
    let fallback = replay::gather_pseudonym(&[], file_name);

    let size = match fs::metadata(path) {
        Ok(metadata) => metadata.len(),
        Err(e) => {
            return FileOutcome {
                pseudonym: fallback,
                version: String::new(),
                result: LogResult::Internal(format!("cannot stat the logfile: {e}")),
            };
        }
    };
    if size > options.max_file_size {
        return FileOutcome {
            pseudonym: fallback,
            version: String::new(),
            result: LogResult::Internal(format!(
                "the logfile exceeds the size limit ({size} bytes, limit {})",
                options.max_file_size
            )),
        };
    }

    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) => {
            return FileOutcome {
                pseudonym: fallback,
                version: String::new(),
                result: LogResult::Internal(format!("cannot read the logfile: {e}")),
            };
        }
    };

    let records = match parse_log(raw.lines()) {
        Ok(records) => records,
        Err(e) => {
            return FileOutcome {
                pseudonym: fallback,
                version: String::new(),
                result: bucket(e),
            };
        }
    };

    let pseudonym = replay::gather_pseudonym(&records, file_name);
    let version = replay::gather_version(&records);
    let done = |result| FileOutcome {
        pseudonym: pseudonym.clone(),
        version: version.clone(),
        result,
    };

    if records.len() < MIN_EVENT_COUNT {
        return done(LogResult::Filtered(FilterReason::TooFewEvents {
            events: records.len(),
        }));
    }

    let group = match replay::gather_group(&records, &version) {
        Ok(group) => group.to_lowercase(),
        Err(e) => return done(bucket(e)),
    };
    if let Some(reason) = filter_group(&group, options) {
        return done(LogResult::Filtered(reason));
    }

    let sequenced = match Sequencer::with_threshold(options.sync_threshold_secs)
        .sequence(records, &pseudonym)
    {
        Ok(outcome) => outcome,
        Err(e) => return done(bucket(e)),
    };

    match replay::replay(Arc::clone(config), sequenced.records, &pseudonym) {
        Ok(mut participant) => {
            participant.critical_time_drifts = sequenced.critical_drifts;
            done(LogResult::Output(Box::new(participant)))
        }
        Err(e) => done(bucket(e)),
    }
}

/// Applies the debug and group filters to a lowercased group name.
fn filter_group(group: &str, options: &BatchOptions) -> Option<FilterReason> {
    let stripped = if group.starts_with("debug") && group != "debug" {
        &group["debug".len()..]
    } else {
        group
    };
    let is_debug = stripped != group;

    if is_debug && !options.allow_debug {
        return Some(FilterReason::DebugGroup {
            group: stripped.to_string(),
        });
    }

    if !options.groups.is_empty() {
        // With debug output enabled the filter matches the underlying
        // group, otherwise the name exactly as assigned
        let candidate = if options.allow_debug { stripped } else { group };
        if !options
            .groups
            .iter()
            .any(|selected| selected.eq_ignore_ascii_case(candidate))
        {
            return Some(FilterReason::GroupNotSelected {
                group: group.to_string(),
            });
        }
    }
    None
}

fn bucket(error: ReplayError) -> LogResult {
    match error {
        ReplayError::Syntax(e) => LogResult::Errored(e),
        ReplayError::Filtered(reason) => LogResult::Filtered(reason),
        ReplayError::Internal(message) => LogResult::Internal(message),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options() -> BatchOptions {
        BatchOptions::new("/tmp/unused")
    }

    #[test]
    fn test_filter_debug_group() {
        let reason = filter_group("debugalpha", &options());
        assert!(matches!(
            reason,
            Some(FilterReason::DebugGroup { group }) if group == "alpha"
        ));

        // A group literally named debug is not a debug group
        assert!(filter_group("debug", &options()).is_none());

        let mut allowing = options();
        allowing.allow_debug = true;
        assert!(filter_group("debugalpha", &allowing).is_none());
    }

    #[test]
    fn test_group_allow_list() {
        let mut opts = options();
        opts.groups = vec!["alpha".to_string()];

        assert!(filter_group("alpha", &opts).is_none());
        assert!(matches!(
            filter_group("beta", &opts),
            Some(FilterReason::GroupNotSelected { .. })
        ));

        // Without --allow-debug the debug filter wins over the allow list
        assert!(matches!(
            filter_group("debugalpha", &opts),
            Some(FilterReason::DebugGroup { .. })
        ));

        // With it, the underlying group is matched
        opts.allow_debug = true;
        assert!(filter_group("debugalpha", &opts).is_none());
    }

    #[test]
    fn test_summary_counts() {
        let mut report = BatchReport::default();
        report.empty = 2;
        report.internal.push(("p".to_string(), "boom".to_string()));
        assert_eq!(
            report.summary(),
            "3 logs processed: 0 output, 0 filtered, 0 errored, 1 internal, 2 empty"
        );
        assert!(report.has_internal_errors());
    }

    #[test]
    fn test_render_vip() {
        let mut report = BatchReport::default();
        assert!(report.render_vip().is_none());

        report
            .vip_errors
            .insert("cafebabe".to_string(), "the log is too small".to_string());
        let rendered = report.render_vip().unwrap();
        assert!(rendered.starts_with(" --- VIP Logs with errors --- "));
        assert!(rendered.contains("cafebabe: the log is too small"));
    }
}
