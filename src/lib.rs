//! `studylog` - Offline statistics for browser-based reverse
//! engineering studies.
//!
//! This library parses the participant logs a study deployment wrote,
//! validates and orders them, replays each one through a participant →
//! phase → level state machine and exports the aggregated results.

pub mod batch;
pub mod cli;
pub mod config;
pub mod error;
pub mod export;
pub mod observability;
pub mod parser;
pub mod replay;
pub mod sequencer;
