//! Error types for `studylog`.
//!
//! Per-log failures are classified into three disjoint kinds so the batch
//! driver can bucket them: syntax/validation errors (bad log), filtered
//! logs (out of scope, not an error) and internal errors (engine defect).

use std::path::PathBuf;
use thiserror::Error;

// ============================================================================
// Exit Codes
// ============================================================================

/// Exit codes for `studylog` CLI operations.
pub struct ExitCode;

impl ExitCode {
    /// Successful execution
    pub const SUCCESS: i32 = 0;

    /// General error (including internal replay errors surfaced by a batch)
    pub const ERROR: i32 = 1;

    /// Configuration error (invalid YAML, validation failure)
    pub const CONFIG_ERROR: i32 = 2;

    /// I/O error (file not found, permission denied)
    pub const IO_ERROR: i32 = 3;

    /// Usage error (invalid arguments, missing required options)
    pub const USAGE_ERROR: i32 = 64;

    /// Interrupted by SIGINT (Ctrl+C)
    pub const INTERRUPTED: i32 = 130;

    /// Terminated by SIGTERM
    pub const TERMINATED: i32 = 143;
}

// ============================================================================
// Top-Level Error
// ============================================================================

/// Top-level error type for `studylog` operations.
///
/// Aggregates all domain-specific errors and provides a unified interface
/// for error handling and exit code mapping.
#[derive(Debug, Error)]
pub enum StudylogError {
    /// Configuration loading or validation error
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Per-log replay failure that escaped the batch bucketing
    #[error(transparent)]
    Replay(#[from] ReplayError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML parsing error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl StudylogError {
    /// Returns the appropriate exit code for this error.
    #[must_use]
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::Config(_) | Self::Json(_) | Self::Yaml(_) => ExitCode::CONFIG_ERROR,
            Self::Replay(_) => ExitCode::ERROR,
            Self::Io(_) => ExitCode::IO_ERROR,
        }
    }
}

// ============================================================================
// Per-Log Replay Errors
// ============================================================================

/// Failure classification for a single participant log.
///
/// The three kinds are disjoint by design: `Syntax` means the log is bad,
/// `Filtered` means the log is fine but out of scope for this analysis,
/// `Internal` means the engine itself broke an invariant and the result
/// must not be trusted.
#[derive(Debug, Error)]
pub enum ReplayError {
    /// The log did not pass validation (malformed line, illegal state
    /// transition, broken timestamp ordering, count mismatch, ...).
    #[error(transparent)]
    Syntax(#[from] LogSyntaxError),

    /// The log is out of scope for the current analysis. Not an error.
    #[error(transparent)]
    Filtered(#[from] FilterReason),

    /// An invariant the engine is supposed to guarantee was violated.
    /// Indicates an engine defect, not a data problem.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ReplayError {
    /// Shorthand for a syntax error without a known origin line.
    pub fn syntax(message: impl Into<String>) -> Self {
        Self::Syntax(LogSyntaxError::new(message))
    }

    /// Shorthand for an internal engine error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Attaches a 1-based origin line to a syntax error that lacks one.
    #[must_use]
    pub fn with_line(self, line: usize) -> Self {
        match self {
            Self::Syntax(e) if e.line.is_none() => Self::Syntax(LogSyntaxError {
                line: Some(line),
                ..e
            }),
            other => other,
        }
    }
}

/// The log file did not pass the validation tests.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct LogSyntaxError {
    /// Human-readable description of the violation
    pub message: String,
    /// 1-based line in the logfile where the offending record starts
    pub line: Option<usize>,
}

impl LogSyntaxError {
    /// Creates a syntax error without line information.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            line: None,
        }
    }

    /// Creates a syntax error pointing at a 1-based logfile line.
    pub fn at_line(message: impl Into<String>, line: usize) -> Self {
        Self {
            message: message.into(),
            line: Some(line),
        }
    }
}

/// Reasons a syntactically valid log was dropped from the analysis.
#[derive(Debug, Clone, Error)]
pub enum FilterReason {
    /// The game was never really started (crawler hits etc.)
    #[error("the log is too small ({events} events)")]
    TooFewEvents {
        /// Number of parsed event records
        events: usize,
    },

    /// The participant's group is not in the configured group filter
    #[error("group '{group}' is not selected by the group filter")]
    GroupNotSelected {
        /// The group found in the log
        group: String,
    },

    /// The participant played in a debug group and debug output is off
    #[error("'{group}' is a debug group")]
    DebugGroup {
        /// The group found in the log, debug prefix stripped
        group: String,
    },
}

// ============================================================================
// Configuration Errors
// ============================================================================

/// Study configuration loading and validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// YAML/JSON parsing failed
    #[error("parse error in {path}: {message}")]
    ParseError {
        /// Path to the configuration file
        path: PathBuf,
        /// Error message from the parser
        message: String,
    },

    /// Configuration validation failed
    #[error("validation failed for {path}")]
    ValidationError {
        /// Path to the configuration file
        path: String,
        /// List of validation issues found
        errors: Vec<ValidationIssue>,
    },

    /// Referenced configuration file not found
    #[error("file not found: {path}")]
    MissingFile {
        /// Path to the missing file
        path: PathBuf,
    },

    /// A group references something that does not exist
    #[error("unknown reference '{name}' at {location}")]
    UnknownReference {
        /// The referenced name (level list, group, ...)
        name: String,
        /// Location in the configuration (e.g. "groups.alpha.Quali.pools")
        location: String,
    },

    /// Field has an invalid value
    #[error("invalid value for '{field}': got '{value}', expected {expected}")]
    InvalidValue {
        /// Name of the field with invalid value
        field: String,
        /// The actual value provided
        value: String,
        /// Description of what was expected
        expected: String,
    },

    /// Configuration file exceeds the size limit
    #[error("configuration too large: {size} bytes (limit: {limit})")]
    TooLarge {
        /// Actual file size in bytes
        size: u64,
        /// Configured size limit in bytes
        limit: u64,
    },
}

// ============================================================================
// Validation Types
// ============================================================================

/// A single validation issue found during configuration validation.
#[derive(Debug, Clone)]
pub struct ValidationIssue {
    /// Path to the problematic field (e.g. "groups.alpha.phases[2]")
    pub path: String,
    /// Description of the validation issue
    pub message: String,
    /// Severity level of the issue
    pub severity: Severity,
}

impl std::fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let prefix = match self.severity {
            Severity::Error => "error",
            Severity::Warning => "warning",
        };
        write!(f, "{}: {} at {}", prefix, self.message, self.path)
    }
}

/// Severity level for validation issues.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Validation failure that prevents the configuration from being used
    Error,
    /// Potential issue that does not prevent configuration loading
    Warning,
}

// ============================================================================
// Result Type Alias
// ============================================================================

/// Result type alias for `studylog` operations.
pub type Result<T> = std::result::Result<T, StudylogError>;

// ============================================================================
// Tests
// ============================================================================
