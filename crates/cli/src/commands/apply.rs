//! `cascade apply`: write versions, changelogs and release markers.

use super::CommandOutput;
use crate::cli::{CliError, EXIT_EMPTY_PLAN};
use cascade_release::{PlanOutcome, ReleasePipeline, ReleasePlan};
use serde::Serialize;
use std::fmt::Write;
use std::path::Path;

/// Result of `apply` for JSON mode
#[derive(Debug, Serialize)]
pub struct ApplyOutput {
    /// Cycle id of the applied plan
    pub cycle_id: String,
    /// Packages whose files were written, in publish order
    pub applied: Vec<String>,
}

/// Execute the `apply` command.
///
/// Applies the saved plan at `plan_path`, or a freshly computed plan when
/// none is given.
///
/// # Errors
///
/// Returns an error if the plan cannot be loaded or computed, or a write fails.
pub fn execute_apply(
    pipeline: &ReleasePipeline,
    plan_path: Option<&Path>,
) -> Result<CommandOutput, CliError> {
    let plan = match plan_path {
        Some(path) => ReleasePlan::load(path)?,
        None => match pipeline.plan()? {
            PlanOutcome::Ready(plan) => plan,
            PlanOutcome::NothingToRelease => {
                let data = serde_json::json!({ "nothing_to_release": true });
                return Ok(CommandOutput::new("Nothing to release", &data)?
                    .with_exit_code(EXIT_EMPTY_PLAN));
            }
        },
    };

    let applied = pipeline.apply(&plan)?;

    let mut text = String::new();
    if applied.is_empty() {
        let _ = write!(text, "Plan {} is already applied", plan.cycle_id);
    } else {
        let _ = writeln!(text, "Applied plan {}:", plan.cycle_id);
        for id in &applied {
            if let Some(release) = plan.get(id) {
                let _ = writeln!(
                    text,
                    "  {id}: {} -> {}",
                    release.current_version, release.new_version
                );
            }
        }
    }

    let output = ApplyOutput {
        cycle_id: plan.cycle_id.clone(),
        applied,
    };
    CommandOutput::new(text.trim_end(), &output)
}
