//! Command-line definition, error mapping, and output envelopes.

use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use miette::{Diagnostic, Report};
use serde::{Deserialize, Serialize};
use std::io::{self, Write};
use std::path::PathBuf;
use thiserror::Error;

/// Exit codes for the CLI application
pub const EXIT_OK: i32 = 0;
/// At least one package failed to publish
pub const EXIT_FAILED: i32 = 1;
/// Nothing to release
pub const EXIT_EMPTY_PLAN: i32 = 2;
/// Configuration or fatal error
pub const EXIT_FATAL: i32 = 3;

/// CLI-specific error types with exit code mapping
#[derive(Error, Debug, Clone, Diagnostic)]
pub enum CliError {
    /// Configuration error: invalid config, unreadable manifest, dependency cycle
    #[error("Configuration error: {message}")]
    #[diagnostic(code(cascade::cli::config))]
    Config {
        /// The error message
        message: String,
        /// Optional help text
        #[help]
        help: Option<String>,
    },
    /// Release failure outside of configuration (history, I/O, verification)
    #[error("Release error: {message}")]
    #[diagnostic(code(cascade::cli::release))]
    Release {
        /// The error message
        message: String,
        /// Optional help text
        #[help]
        help: Option<String>,
    },
}

impl CliError {
    /// Create a new configuration error with help text
    #[must_use]
    pub fn config_with_help(message: impl Into<String>, help: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
            help: Some(help.into()),
        }
    }

    /// Create a new release error
    #[must_use]
    pub fn release(message: impl Into<String>) -> Self {
        Self::Release {
            message: message.into(),
            help: None,
        }
    }

    /// Machine-readable code used in the JSON error envelope
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::Config { .. } => "config",
            Self::Release { .. } => "release",
        }
    }
}

/// Convert `cascade_release::Error` to the matching `CliError` variant,
/// keeping the library's help text.
impl From<cascade_release::Error> for CliError {
    fn from(err: cascade_release::Error) -> Self {
        let help = err.help().map(|h| h.to_string());
        let message = err.to_string();
        if err.is_configuration() {
            Self::Config { message, help }
        } else {
            Self::Release { message, help }
        }
    }
}

/// Map CLI error to exit code
#[must_use]
pub const fn exit_code_for(_err: &CliError) -> i32 {
    EXIT_FATAL
}

/// Render error appropriately based on JSON flag
#[allow(clippy::print_stdout, clippy::print_stderr)]
pub fn render_error(err: &CliError, json_mode: bool) {
    if json_mode {
        let error_envelope = ErrorEnvelope::new(serde_json::json!({
            "code": err.code(),
            "message": err.to_string(),
        }));
        match serde_json::to_string(&error_envelope) {
            Ok(json) => println!("{json}"),
            Err(_) => eprintln!("Error serializing error response"),
        }
    } else {
        let report = Report::new(err.clone());
        eprintln!("{report:?}");
        let _ = io::stderr().flush();
    }
}

/// Success response envelope for JSON output
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OkEnvelope<T> {
    /// Status indicator - always "ok" for success
    pub status: &'static str,
    /// The actual data payload
    pub data: T,
}

impl<T> OkEnvelope<T> {
    /// Create a new success envelope
    #[must_use]
    pub const fn new(data: T) -> Self {
        Self { status: "ok", data }
    }
}

/// Error response envelope for JSON output
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorEnvelope<E> {
    /// Status indicator - always "error" for failures
    pub status: &'static str,
    /// The error details
    pub error: E,
}

impl<E> ErrorEnvelope<E> {
    /// Create a new error envelope
    #[must_use]
    pub const fn new(error: E) -> Self {
        Self {
            status: "error",
            error,
        }
    }
}

/// Release orchestration for multi-package workspaces.
///
/// Plans version cascades from conventional commits, writes versions and
/// changelogs, and publishes packages in dependency order.
#[derive(Parser, Debug)]
#[command(name = "cascade")]
#[command(about = "Release orchestration for multi-package workspaces")]
#[command(long_about = None)]
#[command(version)]
pub struct Cli {
    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,

    /// Logging verbosity level.
    #[arg(
        short = 'L',
        long,
        global = true,
        help = "Set logging level",
        default_value = "warn",
        value_enum
    )]
    pub level: crate::tracing::LogLevel,

    /// Emit JSON envelopes and JSON logs.
    #[arg(long, global = true, help = "Emit JSON envelopes and JSON logs")]
    pub json: bool,

    /// Configuration file (defaults to `<root>/cascade.toml`).
    #[arg(long, short = 'c', global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Workspace root.
    #[arg(
        long,
        short = 'C',
        global = true,
        value_name = "DIR",
        default_value = "."
    )]
    pub root: PathBuf,
}

/// History selection shared by commands that compute a plan.
#[derive(clap::Args, Debug, Clone, Default)]
pub struct HistoryArgs {
    /// Read commits from a JSON-lines file instead of git.
    #[arg(long, value_name = "FILE")]
    pub commits: Option<PathBuf>,

    /// Read commits after this revision instead of the last release marker.
    #[arg(long, value_name = "REV")]
    pub since: Option<String>,

    /// Date for changelog headings (YYYY-MM-DD, defaults to today).
    #[arg(long, value_name = "DATE")]
    pub date: Option<NaiveDate>,
}

/// Available CLI subcommands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Compute the release plan without changing anything.
    #[command(about = "Compute the release plan without changing anything")]
    Plan {
        /// History selection.
        #[command(flatten)]
        history: HistoryArgs,

        /// Save the plan to this file.
        #[arg(long, short = 'o', value_name = "FILE")]
        out: Option<PathBuf>,
    },
    /// Write planned versions, changelogs and release markers.
    #[command(about = "Write planned versions, changelogs and release markers")]
    Apply {
        /// Saved plan to apply; computed from history when omitted.
        #[arg(value_name = "PLAN")]
        plan: Option<PathBuf>,

        /// History selection when no plan file is given.
        #[command(flatten)]
        history: HistoryArgs,
    },
    /// Verify and publish a saved plan in dependency order.
    #[command(about = "Verify and publish a saved plan in dependency order")]
    Execute {
        /// Saved plan to publish.
        #[arg(value_name = "PLAN")]
        plan: PathBuf,

        /// Report what would be published without touching the registry.
        #[arg(long)]
        dry_run: bool,
    },
    /// Yank one package published by a previous run.
    #[command(about = "Yank one package published by a previous run")]
    Rollback {
        /// Package to yank.
        #[arg(value_name = "PACKAGE")]
        package: String,

        /// Cycle id of the run.
        #[arg(long, required_unless_present = "report", conflicts_with = "report")]
        cycle: Option<String>,

        /// Path to the run report.
        #[arg(long, value_name = "FILE")]
        report: Option<PathBuf>,
    },
}

impl Commands {
    /// Command name used in spans and logs.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Plan { .. } => "plan",
            Self::Apply { .. } => "apply",
            Self::Execute { .. } => "execute",
            Self::Rollback { .. } => "rollback",
        }
    }
}

/// Parse command-line arguments.
#[must_use]
pub fn parse() -> Cli {
    Cli::parse()
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_plan_with_globals() {
        let cli = Cli::try_parse_from([
            "cascade", "--json", "plan", "--commits", "log.jsonl", "--date", "2024-01-05", "-o",
            "plan.json",
        ])
        .unwrap();
        assert!(cli.json);
        match cli.command {
            Commands::Plan { history, out } => {
                assert_eq!(history.commits, Some(PathBuf::from("log.jsonl")));
                assert_eq!(history.date, NaiveDate::from_ymd_opt(2024, 1, 5));
                assert_eq!(out, Some(PathBuf::from("plan.json")));
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_rollback_requires_cycle_or_report() {
        assert!(Cli::try_parse_from(["cascade", "rollback", "core"]).is_err());
        assert!(Cli::try_parse_from(["cascade", "rollback", "core", "--cycle", "abc"]).is_ok());
        assert!(
            Cli::try_parse_from([
                "cascade", "rollback", "core", "--cycle", "abc", "--report", "r.json"
            ])
            .is_err()
        );
    }

    #[test]
    fn test_error_mapping() {
        let err: CliError = cascade_release::Error::config("bad", "fix it").into();
        assert_eq!(err.code(), "config");
        assert_eq!(exit_code_for(&err), EXIT_FATAL);

        let err: CliError = cascade_release::Error::history("no repo").into();
        assert_eq!(err.code(), "release");
    }

    #[test]
    fn test_envelopes() {
        let ok = serde_json::to_value(OkEnvelope::new(1)).unwrap();
        assert_eq!(ok["status"], "ok");
        let err = serde_json::to_value(ErrorEnvelope::new("x")).unwrap();
        assert_eq!(err["status"], "error");
    }
}
