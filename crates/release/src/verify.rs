//! Pre-publish verification.
//!
//! A [`Verifier`] runs once before the publisher touches the registry. A
//! failure aborts `execute` with nothing published.

use crate::config::VerifyConfig;
use crate::error::{Error, Result};
use crate::plan::ReleasePlan;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use tokio::process::Command;

/// Boxed future returned by [`Verifier::verify`].
pub type VerifyFuture<'a> = Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>>;

/// Checks a plan before publishing.
pub trait Verifier: Send + Sync {
    /// Verify the plan.
    fn verify<'a>(&'a self, plan: &'a ReleasePlan) -> VerifyFuture<'a>;
}

/// Verifier that accepts every plan.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopVerifier;

impl Verifier for NoopVerifier {
    fn verify<'a>(&'a self, _plan: &'a ReleasePlan) -> VerifyFuture<'a> {
        Box::pin(async { Ok(()) })
    }
}

/// Runs a configured command, e.g. the workspace test suite.
///
/// The command sees `CASCADE_CYCLE_ID` and `CASCADE_PACKAGES` (comma
/// separated, publish order) in its environment.
#[derive(Debug, Clone)]
pub struct CommandVerifier {
    command: Vec<String>,
    workdir: PathBuf,
}

impl CommandVerifier {
    /// Create a verifier running `command` in `workdir`.
    #[must_use]
    pub fn new(command: Vec<String>, workdir: impl Into<PathBuf>) -> Self {
        Self {
            command,
            workdir: workdir.into(),
        }
    }
}

impl Verifier for CommandVerifier {
    fn verify<'a>(&'a self, plan: &'a ReleasePlan) -> VerifyFuture<'a> {
        Box::pin(async move {
            let Some((program, args)) = self.command.split_first() else {
                return Ok(());
            };
            tracing::info!(program = %program, cycle_id = %plan.cycle_id, "Running verifier");
            let output = Command::new(program)
                .args(args)
                .current_dir(&self.workdir)
                .env("CASCADE_CYCLE_ID", &plan.cycle_id)
                .env("CASCADE_PACKAGES", plan.publish_order.join(","))
                .kill_on_drop(true)
                .output()
                .await
                .map_err(|e| Error::verify(format!("Failed to run {program}: {e}")))?;

            if output.status.success() {
                return Ok(());
            }
            let stderr = String::from_utf8_lossy(&output.stderr);
            let tail: Vec<&str> = stderr.lines().rev().take(20).collect();
            let tail: Vec<&str> = tail.into_iter().rev().collect();
            Err(Error::verify(format!(
                "{program} exited with {}\n{}",
                output.status,
                tail.join("\n")
            )))
        })
    }
}

/// Verifier selected by configuration; an empty command disables verification.
#[must_use]
pub fn from_config(config: &VerifyConfig, root: &Path) -> Box<dyn Verifier> {
    if config.command.is_empty() {
        Box::new(NoopVerifier)
    } else {
        Box::new(CommandVerifier::new(config.command.clone(), root))
    }
}
