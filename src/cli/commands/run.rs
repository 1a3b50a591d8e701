//! The `run` command: replay a directory of logs and export the results.

use tracing::{info, warn};

use crate::batch::{BatchOptions, run_batch};
use crate::cli::args::RunArgs;
use crate::config::load_config;
use crate::error::{ReplayError, StudylogError};
use crate::export;

/// Replays every participant log and writes the statistics.
///
/// # Errors
///
/// Returns a config error when the study configuration does not load, an
/// I/O error when the log directory or output path is inaccessible, and
/// a replay error when any log hit an internal engine defect.
pub async fn run(args: &RunArgs) -> Result<(), StudylogError> {
    let loaded = load_config(&args.config)?;
    for warning in &loaded.warnings {
        warn!("{warning}");
    }

    let mut options = BatchOptions::new(&args.logs);
    options.groups = args.groups.clone();
    options.allow_debug = args.allow_debug;
    options.sync_threshold_secs = args.sync_threshold;
    options.vip = args.vip.clone();
    options.jobs = args.jobs;

    let report = run_batch(loaded.config, options).await?;

    if let Some(ref path) = args.output {
        export::write_csv(path, &report.participants)?;
        info!(
            output = %path.display(),
            rows = report.participants.len(),
            "statistics written"
        );
    }

    println!("{}", report.summary());
    for (version, count) in &report.versions {
        println!("v{version}: {count}");
    }
    for section in [
        report.render_reconnects(),
        report.render_drifts(),
        report.render_vip(),
    ]
    .into_iter()
    .flatten()
    {
        println!("{section}");
    }

    if report.has_internal_errors() {
        return Err(StudylogError::Replay(ReplayError::internal(format!(
            "{} logs hit internal errors, the results cannot be trusted",
            report.internal.len()
        ))));
    }
    Ok(())
}
