//! Event-driven replay of a participant log.
//!
//! The driver feeds sequenced records through the three-level state
//! machine (participant → phase → level) and finalizes it with the last
//! relevant record. Intake helpers pull the pseudonym, logfile version
//! and group out of the log head before the replay starts.

pub mod level;
pub mod participant;
pub mod phase;
pub mod signature;

pub use level::{LevelKind, LevelStats, LevelStatus};
pub use participant::Participant;
pub use phase::{PhaseStats, PhaseStatus};

use std::sync::Arc;

use crate::config::StudyConfig;
use crate::error::ReplayError;
use crate::parser::EventRecord;
use crate::parser::record::{events, keys};

/// The group assignment must appear within this many records.
const GROUP_SEARCH_WINDOW: usize = 9;

/// Logfile format version assumed for logs predating the version field.
const FALLBACK_LOG_VERSION: &str = "0.1.0";

/// Pulls the pseudonym from the `Created Logfile` record, falling back
/// to the `logFile_<pseudonym>.txt` file name.
#[must_use]
pub fn gather_pseudonym(records: &[EventRecord], file_name: &str) -> String {
    if let Some(first) = records.first() {
        if first.event() == events::CREATED_LOG {
            if let Some(pseudonym) = first.get("Pseudonym") {
                return pseudonym.to_string();
            }
        }
    }

    file_name
        .strip_prefix("logFile_")
        .unwrap_or(file_name)
        .strip_suffix(".txt")
        .unwrap_or(file_name)
        .to_string()
}

/// Pulls the logfile format version from the first record, `0.1.0` for
/// logs predating the version field.
#[must_use]
pub fn gather_version(records: &[EventRecord]) -> String {
    records
        .first()
        .filter(|first| first.event() == events::CREATED_LOG)
        .and_then(|first| first.get("Version"))
        .unwrap_or(FALLBACK_LOG_VERSION)
        .to_string()
}

/// Pulls the assigned group from the head of the log.
///
/// # Errors
///
/// Returns a syntax error if no group assignment appears within the
/// first records.
pub fn gather_group(records: &[EventRecord], version: &str) -> Result<String, ReplayError> {
    records
        .iter()
        .take(GROUP_SEARCH_WINDOW)
        .find(|record| record.event() == events::GROUP_ASSIGNMENT)
        .and_then(|record| record.get("Group"))
        .map(str::to_string)
        .ok_or_else(|| {
            ReplayError::syntax(format!(
                "the group assignment is missing from the logs (v{version})"
            ))
        })
}

/// Replays a sequenced log into a finalized [`Participant`].
///
/// Filenames are normalized (a stray `.txt` suffix is stripped) before
/// dispatch. Reconnect markers never act as the terminal record; the
/// last event other than those finalizes the replay. Syntax errors are
/// tagged with the origin line of the offending record.
///
/// # Errors
///
/// Propagates parser-level and state machine errors.
pub fn replay(
    config: Arc<StudyConfig>,
    mut records: Vec<EventRecord>,
    pseudonym: &str,
) -> Result<Participant, ReplayError> {
    let mut participant = Participant::new(config, pseudonym);
    participant.num_events = records.len();

    for record in &mut records {
        if let Some(filename) = record.get(keys::FILENAME) {
            if let Some(stripped) = filename.strip_suffix(".txt") {
                let stripped = stripped.to_string();
                record.set(keys::FILENAME, stripped);
            }
        }
    }

    let mut last: Option<&EventRecord> = None;
    for record in &records {
        if record.event() != events::BACK_ONLINE {
            last = Some(record);
        }

        participant
            .handle_event(record)
            .map_err(|e| e.with_line(record.origin_line))?;
    }

    if let Some(last) = last {
        participant
            .post(last)
            .map_err(|e| e.with_line(last.origin_line))?;
    }

    Ok(participant)
}
