//! `cascade rollback`: yank one package of a previous run.

use super::CommandOutput;
use super::execute::render_table;
use crate::cli::CliError;
use cascade_release::ReleasePipeline;
use std::path::Path;

/// Execute the `rollback` command against the run report at `report_path`.
///
/// # Errors
///
/// Returns an error if the report is missing, the package was not published
/// by that run, or the registry refuses the yank.
pub async fn execute_rollback(
    pipeline: &ReleasePipeline,
    report_path: &Path,
    package: &str,
) -> Result<CommandOutput, CliError> {
    let report = pipeline.rollback(report_path, package).await?;
    let version = report
        .get(package)
        .map(|row| row.version.to_string())
        .unwrap_or_default();
    let text = format!("Rolled back {package} {version}\n\n{}", render_table(&report));
    CommandOutput::new(text, &report)
}
