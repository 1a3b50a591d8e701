//! The `validate` command: check study configurations without a batch run.

use tracing::{info, warn};

use crate::cli::args::ValidateArgs;
use crate::config::load_config;
use crate::error::StudylogError;

/// Loads and validates every given configuration file.
///
/// # Errors
///
/// Returns the first configuration error encountered; warnings are
/// reported but do not fail the command.
pub fn run(args: &ValidateArgs) -> Result<(), StudylogError> {
    for path in &args.files {
        info!(file = %path.display(), "validating configuration");

        let loaded = load_config(path)?;
        for warning in &loaded.warnings {
            warn!("{warning}");
        }

        info!(
            file = %path.display(),
            groups = loaded.config.groups.len(),
            "configuration valid"
        );
    }
    Ok(())
}
