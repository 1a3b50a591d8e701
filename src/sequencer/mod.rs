//! Chronological sequencing and clock drift detection.
//!
//! The parser emits records in file order, which is not guaranteed to be
//! chronological: events are delivered over the network and may arrive
//! late, duplicated or after a reconnect. The sequencer restores a
//! validated order and tracks the client/server clock delta so that
//! records without an explicit server time can be backfilled.

use chrono::Duration;
use tracing::warn;

use crate::error::ReplayError;
use crate::parser::EventRecord;
use crate::parser::record::{events, keys};

/// The live system only emits `TimeSync` events once client and server
/// clock deviate by at least this much. Referenced here so the batch
/// threshold below can be read in relation to it.
pub const LIVE_SYNC_TRIGGER_SECS: f64 = 0.2;

/// Default threshold (seconds) above which a change of the running
/// client/server delta is recorded as a critical drift.
pub const DEFAULT_DRIFT_THRESHOLD_SECS: f64 = 40.0;

/// Only the head of the log is searched for the sort anchor; a log
/// whose first phase request comes later than this is unparseable.
const ANCHOR_SEARCH_WINDOW: usize = 20;

/// Result of a sequencing pass.
#[derive(Debug)]
pub struct SequencerOutcome {
    /// Records in validated chronological order
    pub records: Vec<EventRecord>,
    /// Number of non-monotonic successive pairs found before sorting
    pub violations: usize,
    /// Critical client/server drift samples in seconds (signed)
    pub critical_drifts: Vec<f64>,
}

/// Validates and repairs the chronological order of a parsed log.
#[derive(Debug, Clone)]
pub struct Sequencer {
    drift_threshold_secs: f64,
}

impl Default for Sequencer {
    fn default() -> Self {
        Self {
            drift_threshold_secs: DEFAULT_DRIFT_THRESHOLD_SECS,
        }
    }
}

impl Sequencer {
    /// Creates a sequencer with a custom critical-drift threshold.
    #[must_use]
    pub fn with_threshold(drift_threshold_secs: f64) -> Self {
        Self {
            drift_threshold_secs,
        }
    }

    /// Produces the records in validated chronological order plus drift
    /// diagnostics.
    ///
    /// Records before the first phase request keep their file order:
    /// early assignment events in old logfiles carry unreliable client
    /// timestamps, so only the suffix from the anchor onward is checked
    /// and (stably) sorted. Running the sequencer on an already ordered
    /// log is a no-op with zero reported violations.
    ///
    /// # Errors
    ///
    /// Returns a syntax error if no phase request is found within the
    /// first 20 records — such a log is considered unparseable.
    pub fn sequence(
        &self,
        mut records: Vec<EventRecord>,
        pseudonym: &str,
    ) -> Result<SequencerOutcome, ReplayError> {
        let anchor = records
            .iter()
            .take(ANCHOR_SEARCH_WINDOW)
            .position(|r| r.event() == events::PHASE_REQUESTED)
            .ok_or_else(|| {
                ReplayError::syntax(format!(
                    "unable to sort, no scene was loaded within the first {ANCHOR_SEARCH_WINDOW} events"
                ))
            })?;

        let critical_drifts = self.backfill_server_time(&mut records)?;

        // Count non-monotonic successive pairs in the suffix only
        let violations = records[anchor..]
            .windows(2)
            .filter(|pair| pair[0].time > pair[1].time)
            .count();

        if violations > 0 {
            records[anchor..].sort_by_key(|r| r.time);
            warn!(
                pseudonym = %short_pseudo(pseudonym),
                violations, "sorted out-of-order events"
            );
        }

        Ok(SequencerOutcome {
            records,
            violations,
            critical_drifts,
        })
    }

    /// Tracks the client/server clock delta over `TimeSync` events and
    /// backfills `Server` on records lacking one.
    ///
    /// A positive delta means the client clock runs ahead. Whenever a new
    /// sample moves the running delta by more than the threshold, the
    /// difference is recorded as a critical drift and the new delta is
    /// adopted (ping spike or tampered client clock).
    fn backfill_server_time(
        &self,
        records: &mut [EventRecord],
    ) -> Result<Vec<f64>, ReplayError> {
        let mut current_delta: Option<Duration> = None;
        let mut critical = Vec::new();

        for (i, record) in records.iter_mut().enumerate() {
            if record.event() == events::TIME_SYNC {
                let Some(server) = record.server_time else {
                    return Err(ReplayError::Syntax(crate::error::LogSyntaxError::at_line(
                        format!("{} event without a '{}' timestamp", events::TIME_SYNC, keys::SERVER),
                        record.origin_line,
                    )));
                };
                let new_delta = record.time - server;

                match current_delta {
                    None => current_delta = Some(new_delta),
                    Some(delta) => {
                        let drift = delta - new_delta;
                        let drift_secs =
                            drift.num_milliseconds() as f64 / 1000.0;
                        if drift_secs.abs() > self.drift_threshold_secs {
                            critical.push(drift_secs);
                            current_delta = Some(new_delta);
                            warn!(
                                index = i,
                                drift_secs, "ping spike or tampered client time"
                            );
                        }
                    }
                }
            }

            if record.server_time.is_none() {
                if let Some(delta) = current_delta {
                    record.server_time = Some(record.time - delta);
                }
            }
        }

        Ok(critical)
    }
}

/// Shortens a pseudonym for log output.
#[must_use]
pub fn short_pseudo(pseudonym: &str) -> String {
    const LEN: usize = 16;
    if pseudonym.len() > LEN {
        format!("{}...", &pseudonym[..LEN])
    } else {
        pseudonym.to_string()
    }
}
