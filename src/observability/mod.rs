//! Logging infrastructure for monitoring batch runs.

pub mod logging;

pub use logging::{LogFormat, init_logging};
