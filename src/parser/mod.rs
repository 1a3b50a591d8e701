//! Legacy text log parser.
//!
//! Turns the raw line-oriented logfile (one blank-line separated block
//! per interaction) into an ordered list of [`EventRecord`]s. The parser
//! validates syntax only; chronological order is the sequencer's job.

pub mod record;

pub use record::{EventRecord, parse_timestamp};

use chrono::{DateTime, Utc};
use indexmap::IndexMap;

use crate::error::{LogSyntaxError, ReplayError};
use crate::parser::record::keys;

/// Partially assembled record while scanning a block of lines.
#[derive(Debug, Default)]
struct PendingRecord {
    fields: IndexMap<String, String>,
    time: Option<DateTime<Utc>>,
    server_time: Option<DateTime<Utc>>,
    origin_line: Option<usize>,
}

impl PendingRecord {
    fn is_empty(&self) -> bool {
        self.fields.is_empty() && self.time.is_none() && self.server_time.is_none()
    }

    /// Finishes the block at a separator or end of input.
    ///
    /// Completely empty blocks (consecutive blank lines) yield `None`;
    /// a partial record is a syntax error.
    fn finish(self, end_line: usize) -> Result<Option<EventRecord>, ReplayError> {
        if self.is_empty() {
            return Ok(None);
        }

        let origin = self.origin_line.unwrap_or(end_line);
        let Some(time) = self.time else {
            return Err(ReplayError::Syntax(LogSyntaxError::at_line(
                format!(
                    "missing at least one of the necessary keys \"{}\" and \"{}\"",
                    keys::EVENT,
                    keys::TIME
                ),
                origin,
            )));
        };

        EventRecord::new(self.fields, time, self.server_time, origin).map(Some)
    }
}

/// Parses a whole logfile into event records.
///
/// Records are separated by one or more blank lines. Within a record,
/// every line must be of the form `§key: value` or `key: value`; the
/// stray `Â` byte in front of the marker is stripped as a workaround
/// for incorrectly encoded legacy files.
///
/// # Errors
///
/// Returns a syntax error with the offending 1-based line number for
/// malformed lines, duplicate keys, broken timestamps and records
/// missing the mandatory `Event`/`Time` keys.
pub fn parse_log<'a>(lines: impl IntoIterator<Item = &'a str>) -> Result<Vec<EventRecord>, ReplayError> {
    let mut parsed = Vec::new();
    let mut entry = PendingRecord::default();
    let mut line_no = 0usize;

    for line in lines {
        line_no += 1;

        // A blank line terminates the current record
        if line.trim_matches(['\r', '\n']).is_empty() {
            if let Some(rec) = std::mem::take(&mut entry).finish(line_no)? {
                parsed.push(rec);
            }
            continue;
        }

        let trimmed = line.trim();
        let Some((raw_key, raw_value)) = trimmed.split_once(':') else {
            return Err(ReplayError::Syntax(LogSyntaxError::at_line(
                format!(
                    "invalid entry, must be of form \"§key: value\" or \"key: value\", got '{trimmed}'"
                ),
                line_no,
            )));
        };

        // The Â removal is a workaround for incorrectly encoded files
        let key = raw_key
            .trim_end()
            .trim_start_matches('Â')
            .trim_start_matches('§');
        let value = raw_value.trim_start();

        if entry.origin_line.is_none() {
            entry.origin_line = Some(line_no);
        }

        match key {
            keys::TIME => {
                entry.time = Some(parse_timestamp(value).map_err(|e| e.with_line(line_no))?);
            }
            keys::SERVER => {
                let server = parse_timestamp(value).map_err(|e| e.with_line(line_no))?;
                entry.server_time = Some(server);
                // Back-fill the client time from the server clock for
                // server-originated events
                if entry.time.is_none() {
                    entry.time = Some(server);
                }
            }
            _ => {
                if entry.fields.contains_key(key) {
                    return Err(ReplayError::Syntax(LogSyntaxError::at_line(
                        format!("found duplicate key \"{key}\""),
                        line_no,
                    )));
                }
                entry.fields.insert(key.to_string(), value.to_string());
            }
        }
    }

    // Flush the last record if the log did not end with a blank line
    if let Some(rec) = entry.finish(line_no + 1)? {
        parsed.push(rec);
    }

    Ok(parsed)
}
