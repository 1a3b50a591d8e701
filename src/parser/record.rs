//! Parsed log event records.
//!
//! An [`EventRecord`] is one blank-line separated block of the legacy
//! text log, keys in original order, with the two mandatory derived
//! fields (`Event`, `Time`) promoted to typed accessors.

use chrono::{DateTime, TimeZone, Utc};
use indexmap::IndexMap;

use crate::error::{LogSyntaxError, ReplayError};

/// Well-known log file keys.
pub mod keys {
    /// Event discriminator, mandatory on every record
    pub const EVENT: &str = "Event";
    /// Client timestamp in ms since epoch, mandatory on every record
    pub const TIME: &str = "Time";
    /// Server timestamp in ms since epoch, optional
    pub const SERVER: &str = "Server";
    /// Level file name carried by `new <Type>` events
    pub const FILENAME: &str = "Filename";
    /// Level type carried by the `Loaded` event
    pub const TYPE: &str = "Type";
}

/// Event names that are matched structurally (outside the signature table).
pub mod events {
    /// First reliable client-originated event, the sort anchor
    pub const PHASE_REQUESTED: &str = "change in Scene";
    /// Clock synchronisation sample, carries both `Time` and `Server`
    pub const TIME_SYNC: &str = "TimeSync";
    /// Reconnect marker; never used as the terminal `post` event
    pub const BACK_ONLINE: &str = "Online after disconnection";
    /// First record of every log, carries `Version` and `Pseudonym`
    pub const CREATED_LOG: &str = "Created Logfile";
    /// Group assignment, expected within the first few records
    pub const GROUP_ASSIGNMENT: &str = "Group Assignment";
    /// Prefix of the two-part level delivery (`new Level`, `new Info`, ...)
    pub const LEVEL_REQUESTED_PREFIX: &str = "new ";
}

/// One parsed log entry: ordered key/value pairs plus derived timestamps.
///
/// `Time` and `Server` are not stored in `fields`; they are parsed into
/// [`DateTime`] values at parse time. Every record emitted by the parser
/// is guaranteed to carry `Event` and `time`.
#[derive(Debug, Clone)]
pub struct EventRecord {
    fields: IndexMap<String, String>,
    /// Client timestamp (ms precision)
    pub time: DateTime<Utc>,
    /// Server timestamp, present on server-originated events and after
    /// the sequencer's backfill pass
    pub server_time: Option<DateTime<Utc>>,
    /// 1-based line where this record starts in the logfile
    pub origin_line: usize,
}

impl EventRecord {
    /// Creates a record from already-parsed parts. Used by the parser
    /// and by tests building synthetic logs.
    ///
    /// # Errors
    ///
    /// Returns a syntax error if the `Event` key is missing.
    pub fn new(
        fields: IndexMap<String, String>,
        time: DateTime<Utc>,
        server_time: Option<DateTime<Utc>>,
        origin_line: usize,
    ) -> Result<Self, ReplayError> {
        if !fields.contains_key(keys::EVENT) {
            return Err(ReplayError::Syntax(LogSyntaxError::at_line(
                format!("missing at least one of the necessary keys \"{}\" and \"{}\"", keys::EVENT, keys::TIME),
                origin_line,
            )));
        }
        Ok(Self {
            fields,
            time,
            server_time,
            origin_line,
        })
    }

    /// The event discriminator.
    #[must_use]
    pub fn event(&self) -> &str {
        // Guaranteed by the constructor
        self.fields.get(keys::EVENT).map_or("", String::as_str)
    }

    /// Looks up a field value by key.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields.get(key).map(String::as_str)
    }

    /// Looks up a field that a handler requires to be present.
    ///
    /// # Errors
    ///
    /// Returns a syntax error naming the missing key.
    pub fn require(&self, key: &str) -> Result<&str, ReplayError> {
        self.get(key).ok_or_else(|| {
            ReplayError::Syntax(LogSyntaxError::at_line(
                format!("event '{}' is missing the key '{key}'", self.event()),
                self.origin_line,
            ))
        })
    }

    /// Parses a required field as a non-negative integer.
    ///
    /// # Errors
    ///
    /// Returns a syntax error if the key is missing or not a number.
    pub fn require_u32(&self, key: &str) -> Result<u32, ReplayError> {
        let raw = self.require(key)?;
        raw.trim().parse::<u32>().map_err(|_| {
            ReplayError::Syntax(LogSyntaxError::at_line(
                format!("'{key}' is not a non-negative integer: '{raw}'"),
                self.origin_line,
            ))
        })
    }

    /// Rewrites a field value in place (used to normalize `Filename`).
    pub fn set(&mut self, key: &str, value: String) {
        self.fields.insert(key.to_string(), value);
    }

    /// Iterates over the fields in original log order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

/// Truthy values of the client boolean vocabulary. `True`/`False` appear
/// as `0`/`1` in older logfile versions.
const X_TRUE: &[&str] = &["1", "true", "yes"];
/// Falsy values of the client boolean vocabulary.
const X_FALSE: &[&str] = &["0", "false", "no"];

/// Parses a client-reported boolean flag (e.g. `Level Solved`).
///
/// # Errors
///
/// Returns a syntax error if the value is outside the known vocabulary.
pub fn parse_flag(value: &str) -> Result<bool, ReplayError> {
    let v = value.trim().to_lowercase();
    if X_TRUE.contains(&v.as_str()) {
        Ok(true)
    } else if X_FALSE.contains(&v.as_str()) {
        Ok(false)
    } else {
        Err(ReplayError::syntax(format!(
            "'{value}' is not a known boolean value"
        )))
    }
}

/// Parses a unix timestamp in milliseconds from its string form.
///
/// The value must be a positive, finite decimal number.
///
/// # Errors
///
/// Returns a syntax error for non-numeric, non-finite or non-positive input.
pub fn parse_timestamp(value: &str) -> Result<DateTime<Utc>, ReplayError> {
    let millis: f64 = value
        .trim()
        .parse()
        .map_err(|_| ReplayError::syntax(format!("the string is not a number: '{value}'")))?;
    if !millis.is_finite() || millis <= 0.0 {
        return Err(ReplayError::syntax(format!(
            "could not convert unix time, must be a number greater than zero: '{value}'"
        )));
    }
    #[allow(clippy::cast_possible_truncation)]
    Utc.timestamp_millis_opt(millis as i64)
        .single()
        .ok_or_else(|| ReplayError::syntax(format!("timestamp out of range: '{value}'")))
}

/// Milliseconds between two timestamps as fractional seconds.
///
/// # Errors
///
/// Returns a syntax error if `end` precedes `start` — the monotonic-time
/// invariant every caller relies on.
pub fn duration_seconds(
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> Result<f64, ReplayError> {
    let millis = end.timestamp_millis() - start.timestamp_millis();
    if millis < 0 {
        return Err(ReplayError::syntax(format!(
            "the calculated duration is negative: start {start} is after end {end}"
        )));
    }
    #[allow(clippy::cast_precision_loss)]
    Ok(millis as f64 / 1000.0)
}
