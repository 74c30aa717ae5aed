//! Command-backed registry.
//!
//! Runs operator-configured command templates. `{package}` and `{version}`
//! are substituted in every argument. Exit status 0 means success; for
//! `exists` a non-zero status means "not published". A failed publish whose
//! output matches the already-exists pattern counts as already satisfied, and
//! one matching the transient pattern is retried by the publisher.

use super::{PublishOutcome, Registry, RegistryError, RegistryFuture};
use crate::config::RegistryConfig;
use crate::error::{Error, Result};
use crate::version::Version;
use regex::Regex;
use std::path::{Path, PathBuf};
use std::process::Output;
use tokio::process::Command;

/// Registry driven by shell commands.
#[derive(Debug, Clone)]
pub struct CommandRegistry {
    workdir: PathBuf,
    exists: Vec<String>,
    publish: Vec<String>,
    yank: Vec<String>,
    already_exists: Regex,
    transient: Regex,
}

fn compile(pattern: &str, key: &str) -> Result<Regex> {
    Regex::new(pattern).map_err(|e| {
        Error::config(
            format!("Invalid registry.{key} '{pattern}': {e}"),
            "Fix the regex in the [registry] section of cascade.toml",
        )
    })
}

impl CommandRegistry {
    /// Build from configuration; commands run in `workdir`.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if no publish command is configured or a
    /// pattern is not a valid regex.
    pub fn from_config(config: &RegistryConfig, workdir: &Path) -> Result<Self> {
        if config.publish.is_empty() {
            return Err(Error::config(
                "Command registry has no publish command",
                "Set registry.publish, e.g. publish = [\"npm\", \"publish\", \"{package}\"]",
            ));
        }
        Ok(Self {
            workdir: workdir.to_path_buf(),
            exists: config.exists.clone(),
            publish: config.publish.clone(),
            yank: config.yank.clone(),
            already_exists: compile(&config.already_exists_pattern, "alreadyExistsPattern")?,
            transient: compile(&config.transient_pattern, "transientPattern")?,
        })
    }

    async fn run(
        &self,
        template: &[String],
        package: &str,
        version: &Version,
    ) -> std::result::Result<Output, RegistryError> {
        let version = version.to_string();
        let args: Vec<String> = template
            .iter()
            .map(|arg| arg.replace("{package}", package).replace("{version}", &version))
            .collect();
        let Some((program, rest)) = args.split_first() else {
            return Err(RegistryError::rejected("empty command template"));
        };

        tracing::debug!(program = %program, args = ?rest, "Running registry command");
        Command::new(program)
            .args(rest)
            .current_dir(&self.workdir)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| RegistryError::rejected(format!("Failed to run {program}: {e}")))
    }

    fn classify_failure(
        &self,
        output: &Output,
    ) -> std::result::Result<PublishOutcome, RegistryError> {
        let stderr = String::from_utf8_lossy(&output.stderr);
        let stdout = String::from_utf8_lossy(&output.stdout);
        if self.already_exists.is_match(&stderr) || self.already_exists.is_match(&stdout) {
            return Ok(PublishOutcome::AlreadySatisfied);
        }
        let message = format!("exit {}: {}", output.status, stderr.trim());
        if self.transient.is_match(&stderr) {
            Err(RegistryError::transient(message))
        } else {
            Err(RegistryError::rejected(message))
        }
    }
}

impl Registry for CommandRegistry {
    fn name(&self) -> &'static str {
        "command"
    }

    fn exists<'a>(&'a self, package: &'a str, version: &'a Version) -> RegistryFuture<'a, bool> {
        Box::pin(async move {
            if self.exists.is_empty() {
                return Ok(false);
            }
            let output = self.run(&self.exists, package, version).await?;
            Ok(output.status.success())
        })
    }

    fn publish<'a>(
        &'a self,
        package: &'a str,
        version: &'a Version,
    ) -> RegistryFuture<'a, PublishOutcome> {
        Box::pin(async move {
            let output = self.run(&self.publish, package, version).await?;
            if output.status.success() {
                Ok(PublishOutcome::Published)
            } else {
                self.classify_failure(&output)
            }
        })
    }

    fn yank<'a>(&'a self, package: &'a str, version: &'a Version) -> RegistryFuture<'a, ()> {
        Box::pin(async move {
            if self.yank.is_empty() {
                return Err(RegistryError::rejected("No yank command configured"));
            }
            let output = self.run(&self.yank, package, version).await?;
            if output.status.success() {
                Ok(())
            } else {
                Err(RegistryError::rejected(format!(
                    "exit {}: {}",
                    output.status,
                    String::from_utf8_lossy(&output.stderr).trim()
                )))
            }
        })
    }
}
