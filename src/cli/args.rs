//! Clap derive structs for `studylog` command-line parsing.

use std::path::PathBuf;

use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum};

use crate::sequencer::DEFAULT_DRIFT_THRESHOLD_SECS;

// ============================================================================
// Root CLI
// ============================================================================

/// Offline statistics for browser-based reverse engineering studies.
#[derive(Parser, Debug)]
#[command(name = "studylog", author, version, about)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,

    /// Increase verbosity (-v info, -vv debug, -vvv trace).
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all non-error output.
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Color output control.
    #[arg(long, default_value = "auto", global = true, env = "STUDYLOG_COLOR")]
    pub color: ColorChoice,
}

// ============================================================================
// Top-Level Commands
// ============================================================================

/// Top-level subcommands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Replay a directory of participant logs and export the statistics.
    Run(RunArgs),

    /// Validate study configuration files without running a batch.
    Validate(ValidateArgs),

    /// Generate shell completion scripts.
    Completions(CompletionsArgs),
}

/// Arguments for `run`.
#[derive(Args, Debug)]
pub struct RunArgs {
    /// Path to the study configuration (YAML or JSON).
    #[arg(short, long, env = "STUDYLOG_CONFIG")]
    pub config: PathBuf,

    /// Directory holding the `logFile_*.txt` participant logs.
    #[arg(short, long, env = "STUDYLOG_LOGS")]
    pub logs: PathBuf,

    /// Write the flattened per-participant CSV to this path.
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Only keep participants of this group (repeatable).
    #[arg(long = "group")]
    pub groups: Vec<String>,

    /// Keep participants from `debug*` groups.
    #[arg(long)]
    pub allow_debug: bool,

    /// Client/server time drift threshold in seconds.
    #[arg(long, default_value_t = DEFAULT_DRIFT_THRESHOLD_SECS)]
    pub sync_threshold: f64,

    /// Report the failure reason of this pseudonym verbatim (repeatable).
    #[arg(long = "vip")]
    pub vip: Vec<String>,

    /// Maximum number of concurrently processed logs.
    #[arg(short, long)]
    pub jobs: Option<usize>,
}

/// Arguments for `validate`.
#[derive(Args, Debug)]
pub struct ValidateArgs {
    /// Configuration files to validate.
    #[arg(required = true)]
    pub files: Vec<PathBuf>,
}

/// Arguments for shell completion generation.
#[derive(Args, Debug)]
pub struct CompletionsArgs {
    /// Target shell for completion script.
    pub shell: Shell,
}

// ============================================================================
// CLI-Local Enums
// ============================================================================

/// Color output choice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum ColorChoice {
    /// Auto-detect terminal support.
    #[default]
    Auto,
    /// Always use color.
    Always,
    /// Never use color.
    Never,
}

/// Shell type for completion generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Shell {
    /// Bash shell.
    Bash,
    /// Zsh shell.
    Zsh,
    /// Fish shell.
    Fish,
    /// `PowerShell`.
    #[value(name = "powershell")]
    PowerShell,
    /// Elvish shell.
    Elvish,
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_with_config_and_logs() {
        let cli = Cli::try_parse_from([
            "studylog", "run", "--config", "study.yaml", "--logs", "logs/",
        ]);
        assert!(cli.is_ok(), "Failed to parse: {cli:?}");
    }

    #[test]
    fn test_run_requires_logs() {
        let cli = Cli::try_parse_from(["studylog", "run", "--config", "study.yaml"]);
        assert!(cli.is_err(), "Expected missing --logs error");
    }

    #[test]
    fn test_repeatable_group_and_vip() {
        let cli = Cli::try_parse_from([
            "studylog", "run", "-c", "s.yaml", "-l", "logs/", "--group", "alpha", "--group",
            "beta", "--vip", "cafebabe",
        ])
        .unwrap();

        let Commands::Run(args) = cli.command else {
            panic!("Expected RunArgs");
        };
        assert_eq!(args.groups, vec!["alpha", "beta"]);
        assert_eq!(args.vip, vec!["cafebabe"]);
        assert!(!args.allow_debug);
    }

    #[test]
    fn test_sync_threshold_default() {
        let cli = Cli::try_parse_from(["studylog", "run", "-c", "s.yaml", "-l", "logs/"]).unwrap();
        let Commands::Run(args) = cli.command else {
            panic!("Expected RunArgs");
        };
        assert!((args.sync_threshold - DEFAULT_DRIFT_THRESHOLD_SECS).abs() < f64::EPSILON);
    }

    #[test]
    fn test_validate_requires_files() {
        let result = Cli::try_parse_from(["studylog", "validate"]);
        assert!(result.is_err(), "Expected error for missing files");
    }

    #[test]
    fn test_color_choices_parse() {
        for variant in ["auto", "always", "never"] {
            let cli = Cli::try_parse_from([
                "studylog", "--color", variant, "run", "-c", "s.yaml", "-l", "logs/",
            ]);
            assert!(cli.is_ok(), "Failed to parse color={variant}");
        }
    }

    #[test]
    fn test_completions_shells_parse() {
        for shell in ["bash", "zsh", "fish", "powershell", "elvish"] {
            let cli = Cli::try_parse_from(["studylog", "completions", shell]);
            assert!(cli.is_ok(), "Failed to parse shell={shell}");
        }
    }

    #[test]
    fn test_verbose_count() {
        let cli =
            Cli::try_parse_from(["studylog", "-vvv", "run", "-c", "s.yaml", "-l", "logs/"])
                .unwrap();
        assert_eq!(cli.verbose, 3);
    }

    #[test]
    fn test_help_output() {
        let result = Cli::try_parse_from(["studylog", "--help"]);
        assert!(result.is_err());
        let err = result.unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::DisplayHelp);
    }
}
