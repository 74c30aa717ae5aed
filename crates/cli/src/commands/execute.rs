//! `cascade execute`: verify and publish a saved plan.

use super::CommandOutput;
use crate::cli::{CliError, EXIT_FAILED, EXIT_FATAL};
use cascade_release::publish::PackageReport;
use cascade_release::{DryRun, PublishReport, ReleasePipeline, ReleasePlan};
use serde::Serialize;
use std::fmt::Write;
use std::path::Path;

/// Report plus the failure to save it, if any.
#[derive(Debug, Serialize)]
struct ExecuteOutput<'a> {
    #[serde(flatten)]
    report: &'a PublishReport,
    #[serde(skip_serializing_if = "Option::is_none")]
    save_error: Option<String>,
}

/// Execute the `execute` command.
///
/// Always renders the per-package state table; exits with [`EXIT_FAILED`]
/// when any package failed and with [`EXIT_FATAL`] when the run report could
/// not be saved.
///
/// # Errors
///
/// Returns an error if the plan cannot be loaded, verification fails, or the
/// registry is misconfigured.
pub async fn execute_publish(
    pipeline: &ReleasePipeline,
    plan_path: &Path,
    dry_run: DryRun,
) -> Result<CommandOutput, CliError> {
    let plan = ReleasePlan::load(plan_path)?;
    let report = pipeline.execute(&plan, dry_run).await?;

    let mut text = render_table(&report);
    let save_error = match pipeline.record(&report) {
        Ok(_) => None,
        Err(err) => {
            tracing::error!(cycle_id = %report.cycle_id, error = %err, "Failed to save run report");
            let _ = write!(text, "\n\nerror: {err}");
            Some(err.to_string())
        }
    };
    let failed_save = save_error.is_some();
    let output = CommandOutput::new(text, &ExecuteOutput { report: &report, save_error })?;
    if failed_save {
        return Ok(output.with_exit_code(EXIT_FATAL));
    }
    if report.has_failures() {
        tracing::warn!(cycle_id = %report.cycle_id, "Release cycle finished with failures");
        return Ok(output.with_exit_code(EXIT_FAILED));
    }
    Ok(output)
}

/// Render a report as an aligned PACKAGE / VERSION / STATE table.
#[must_use]
pub fn render_table(report: &PublishReport) -> String {
    let width = |f: fn(&PackageReport) -> usize, header: &str| {
        report.packages.iter().map(f).chain([header.len()]).max().unwrap_or_default()
    };
    let package_width = width(|row| row.package.len(), "PACKAGE");
    let version_width = width(|row| row.version.to_string().len(), "VERSION");

    let mut text = String::new();
    if report.dry_run {
        let _ = writeln!(text, "Dry run of cycle {}", report.cycle_id);
    } else {
        let _ = writeln!(text, "Cycle {} on {}", report.cycle_id, report.registry);
    }
    let _ = writeln!(
        text,
        "{:<package_width$}  {:<version_width$}  STATE",
        "PACKAGE", "VERSION"
    );
    for row in &report.packages {
        let _ = writeln!(
            text,
            "{:<package_width$}  {:<version_width$}  {}",
            row.package,
            row.version.to_string(),
            row.state
        );
    }
    text.trim_end().to_string()
}
