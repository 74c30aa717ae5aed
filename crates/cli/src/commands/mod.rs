//! Command implementations.
//!
//! Each command returns a [`CommandOutput`] holding both renderings and the
//! exit code; `main` decides which rendering to print.

pub mod apply;
pub mod execute;
pub mod plan;
pub mod rollback;

use crate::cli::{Cli, CliError, Commands, EXIT_OK, HistoryArgs, OkEnvelope};
use cascade_release::ReleasePipeline;
use serde::Serialize;
use std::path::Path;
use tracing::Instrument;

/// Rendered result of a command.
#[derive(Debug, Clone)]
pub struct CommandOutput {
    /// Human-readable output.
    pub text: String,
    /// Payload wrapped in the JSON envelope when `--json` is set.
    pub json: serde_json::Value,
    /// Process exit code.
    pub exit_code: i32,
}

impl CommandOutput {
    /// Output with both renderings and exit code 0.
    ///
    /// # Errors
    ///
    /// Returns an error if `data` cannot be serialized.
    pub fn new(text: impl Into<String>, data: &impl Serialize) -> Result<Self, CliError> {
        let json = serde_json::to_value(OkEnvelope::new(data))
            .map_err(|e| CliError::release(format!("Failed to serialize output: {e}")))?;
        Ok(Self {
            text: text.into(),
            json,
            exit_code: EXIT_OK,
        })
    }

    /// Replace the exit code.
    #[must_use]
    pub const fn with_exit_code(mut self, exit_code: i32) -> Self {
        self.exit_code = exit_code;
        self
    }

    /// The rendering selected by `json`.
    #[must_use]
    pub fn render(&self, json: bool) -> String {
        if json {
            self.json.to_string()
        } else {
            self.text.clone()
        }
    }
}

/// Open the workspace pipeline from the global options.
///
/// # Errors
///
/// Returns a configuration error if an explicit config file does not exist
/// or the config file cannot be loaded.
pub fn open_pipeline(root: &Path, config: Option<&Path>) -> Result<ReleasePipeline, CliError> {
    // Only the default cascade.toml may be absent.
    if let Some(path) = config
        && !path.is_file()
    {
        return Err(CliError::config_with_help(
            format!("Config file not found: {}", path.display()),
            "Pass an existing file to --config, or omit it to use ./cascade.toml",
        ));
    }
    Ok(ReleasePipeline::open(root, config)?)
}

/// Apply the history options to a pipeline.
#[must_use]
pub fn with_history(mut pipeline: ReleasePipeline, history: &HistoryArgs) -> ReleasePipeline {
    if let Some(commits) = &history.commits {
        pipeline = pipeline.with_commits_file(commits);
    }
    if let Some(date) = history.date {
        pipeline = pipeline.with_date(date);
    }
    pipeline.since(history.since.clone())
}

/// Run the parsed command line.
///
/// # Errors
///
/// Returns an error for configuration problems and fatal failures. Failed
/// publishes and empty plans are reported through the exit code instead.
pub async fn run(cli: Cli) -> Result<CommandOutput, CliError> {
    let span = crate::command_span!(cli.command.name());

    async move {
        let root = cli.root.as_path();
        let config = cli.config.as_deref();
        match &cli.command {
            Commands::Plan { history, out } => {
                let pipeline = with_history(open_pipeline(root, config)?, history);
                plan::execute_plan(&pipeline, out.as_deref())
            }
            Commands::Apply { plan, history } => {
                let pipeline = with_history(open_pipeline(root, config)?, history);
                apply::execute_apply(&pipeline, plan.as_deref())
            }
            Commands::Execute { plan, dry_run } => {
                let pipeline = open_pipeline(root, config)?;
                execute::execute_publish(&pipeline, plan, (*dry_run).into()).await
            }
            Commands::Rollback {
                package,
                cycle,
                report,
            } => {
                let pipeline = open_pipeline(root, config)?;
                let path = report.clone().unwrap_or_else(|| {
                    pipeline.report_path(cycle.as_deref().unwrap_or_default())
                });
                rollback::execute_rollback(&pipeline, &path, package).await
            }
        }
    }
    .instrument(span)
    .await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_selects_format() {
        let output = CommandOutput::new("hello", &vec!["a"]).unwrap();
        assert_eq!(output.render(false), "hello");
        assert_eq!(output.render(true), r#"{"data":["a"],"status":"ok"}"#);
        assert_eq!(output.with_exit_code(2).exit_code, 2);
    }

    #[test]
    fn test_missing_explicit_config_is_config_error() {
        let temp = tempfile::TempDir::new().unwrap();
        let missing = temp.path().join("nope.toml");
        let Err(err) = open_pipeline(temp.path(), Some(&missing)) else {
            panic!("missing config file was accepted");
        };
        assert_eq!(err.code(), "config");
        assert!(err.to_string().contains("nope.toml"));

        assert!(open_pipeline(temp.path(), None).is_ok());
    }
}
