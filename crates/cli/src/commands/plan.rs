//! `cascade plan`: compute the release plan without touching the workspace.

use super::CommandOutput;
use crate::cli::{CliError, EXIT_EMPTY_PLAN};
use cascade_release::{PlanOutcome, ReleasePipeline};
use std::path::Path;

/// Execute the `plan` command.
///
/// Prints the plan as JSON and optionally saves it to `out`. An empty plan
/// exits with [`EXIT_EMPTY_PLAN`].
///
/// # Errors
///
/// Returns an error if planning fails or the plan cannot be saved.
pub fn execute_plan(
    pipeline: &ReleasePipeline,
    out: Option<&Path>,
) -> Result<CommandOutput, CliError> {
    let plan = match pipeline.plan()? {
        PlanOutcome::Ready(plan) => plan,
        PlanOutcome::NothingToRelease => {
            tracing::info!("No package needs a release");
            let data = serde_json::json!({ "nothing_to_release": true });
            return Ok(CommandOutput::new("Nothing to release", &data)?
                .with_exit_code(EXIT_EMPTY_PLAN));
        }
    };

    if let Some(out) = out {
        plan.save(out)?;
        tracing::info!(path = %out.display(), cycle_id = %plan.cycle_id, "Saved release plan");
    }

    let text = serde_json::to_string_pretty(&plan)
        .map_err(|e| CliError::release(format!("Failed to serialize plan: {e}")))?;
    CommandOutput::new(text, &plan)
}
