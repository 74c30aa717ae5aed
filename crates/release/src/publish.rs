//! Publishing and rollback.
//!
//! The [`Publisher`] walks a [`ReleasePlan`] in publish order, one registry
//! call at a time, and records a [`PublishState`] per package in a
//! [`PublishReport`]. The first hard failure stops the run; later packages
//! stay [`PublishState::Pending`]. Re-running the same plan is safe: versions
//! the registry already holds come back as skipped.

use crate::config::PublishConfig;
use crate::error::{Error, Result};
use crate::package::PackageId;
use crate::plan::{PlannedRelease, ReleasePlan};
use crate::registry::{PublishOutcome, Registry, RegistryError, RegistryFuture};
use crate::version::Version;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Whether registry writes are performed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum DryRun {
    /// Publish for real.
    #[default]
    No,
    /// Report what would be published without touching the registry.
    Yes,
}

impl DryRun {
    /// Returns true for [`DryRun::Yes`].
    #[must_use]
    pub const fn is_dry_run(self) -> bool {
        matches!(self, Self::Yes)
    }
}

impl From<bool> for DryRun {
    fn from(value: bool) -> Self {
        if value { Self::Yes } else { Self::No }
    }
}

/// Why a package was not uploaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// The registry already holds the version.
    AlreadyPublished,
    /// The package is marked `publishable = false`.
    NotPublishable,
    /// The run was a dry run.
    DryRun,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AlreadyPublished => write!(f, "already published"),
            Self::NotPublishable => write!(f, "not publishable"),
            Self::DryRun => write!(f, "dry run"),
        }
    }
}

/// Publish state of one package.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "detail", rename_all = "snake_case")]
pub enum PublishState {
    /// Not attempted.
    Pending,
    /// Deliberately not uploaded.
    Skipped(SkipReason),
    /// Uploaded by this run.
    Published,
    /// Upload failed; the message describes the last error.
    Failed(String),
    /// Uploaded by this run, then yanked.
    RolledBack,
}

impl PublishState {
    /// Whether this is [`PublishState::Failed`].
    #[must_use]
    pub const fn is_failed(&self) -> bool {
        matches!(self, Self::Failed(_))
    }
}

impl fmt::Display for PublishState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Skipped(reason) => write!(f, "skipped ({reason})"),
            Self::Published => write!(f, "published"),
            Self::Failed(message) => write!(f, "failed: {message}"),
            Self::RolledBack => write!(f, "rolled back"),
        }
    }
}

/// Report row for one package.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageReport {
    /// Package id.
    pub package: PackageId,
    /// Version from the plan.
    pub version: Version,
    /// Final state.
    #[serde(flatten)]
    pub state: PublishState,
    /// Registry publish attempts made.
    #[serde(default)]
    pub attempts: u32,
}

/// Outcome of executing a plan; one row per planned package in publish order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishReport {
    /// Cycle id of the executed plan.
    pub cycle_id: String,
    /// Registry adapter name.
    pub registry: String,
    /// Whether the run was a dry run.
    pub dry_run: bool,
    /// When execution started.
    pub started_at: DateTime<Utc>,
    /// When execution stopped.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    /// Rows in publish order.
    pub packages: Vec<PackageReport>,
}

impl PublishReport {
    fn pending(plan: &ReleasePlan, registry: &str, dry_run: DryRun) -> Self {
        Self {
            cycle_id: plan.cycle_id.clone(),
            registry: registry.to_string(),
            dry_run: dry_run.is_dry_run(),
            started_at: Utc::now(),
            finished_at: None,
            packages: plan
                .ordered()
                .map(|release| PackageReport {
                    package: release.package().to_string(),
                    version: release.new_version.clone(),
                    state: PublishState::Pending,
                    attempts: 0,
                })
                .collect(),
        }
    }

    /// Row of a package.
    #[must_use]
    pub fn get(&self, package: &str) -> Option<&PackageReport> {
        self.packages.iter().find(|row| row.package == package)
    }

    fn get_mut(&mut self, package: &str) -> Option<&mut PackageReport> {
        self.packages.iter_mut().find(|row| row.package == package)
    }

    /// State of a package.
    #[must_use]
    pub fn state(&self, package: &str) -> Option<&PublishState> {
        self.get(package).map(|row| &row.state)
    }

    /// Whether any package failed.
    #[must_use]
    pub fn has_failures(&self) -> bool {
        self.packages.iter().any(|row| row.state.is_failed())
    }

    /// Location of a run report under a state directory.
    #[must_use]
    pub fn path_in(state_dir: &Path, cycle_id: &str) -> PathBuf {
        state_dir.join("runs").join(format!("{cycle_id}.json"))
    }

    /// Fold in the record an earlier run of the same cycle left behind.
    ///
    /// Rows this run skipped as already published, or never reached, take
    /// over the `Published` or `RolledBack` state recorded earlier for the
    /// same version. Reports of other cycles are ignored.
    pub fn merge_earlier(&mut self, earlier: &Self) {
        if earlier.cycle_id != self.cycle_id {
            return;
        }
        for row in &mut self.packages {
            let Some(previous) = earlier.get(&row.package) else {
                continue;
            };
            let carried = matches!(
                previous.state,
                PublishState::Published | PublishState::RolledBack
            );
            let superseded = matches!(
                row.state,
                PublishState::Pending | PublishState::Skipped(SkipReason::AlreadyPublished)
            );
            if carried && superseded && previous.version == row.version {
                tracing::debug!(
                    package = %row.package,
                    state = %previous.state,
                    "Keeping state recorded by an earlier run"
                );
                row.state = previous.state.clone();
                row.attempts = previous.attempts;
            }
        }
        self.started_at = self.started_at.min(earlier.started_at);
    }

    /// Write the report to `runs/<cycle_id>.json` under `state_dir`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn save(&self, state_dir: &Path) -> Result<PathBuf> {
        let path = Self::path_in(state_dir, &self.cycle_id);
        self.save_to(&path)?;
        Ok(path)
    }

    /// Write the report to `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut json = serde_json::to_string_pretty(self)?;
        json.push('\n');
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Read a saved report.
    ///
    /// # Errors
    ///
    /// Returns an error if the file is unreadable or malformed.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::publish(format!("Failed to read run report {}: {e}", path.display()), None)
        })?;
        Ok(serde_json::from_str(&content)?)
    }
}

/// Executes plans against a registry.
pub struct Publisher<'a> {
    registry: &'a dyn Registry,
    config: PublishConfig,
    dry_run: DryRun,
}

impl<'a> Publisher<'a> {
    /// Create a publisher.
    #[must_use]
    pub fn new(registry: &'a dyn Registry, config: PublishConfig) -> Self {
        Self {
            registry,
            config,
            dry_run: DryRun::No,
        }
    }

    /// Set the dry-run mode.
    #[must_use]
    pub const fn with_dry_run(mut self, dry_run: DryRun) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Publish every package of `plan` in order.
    ///
    /// Never fails as a whole; per-package failures are recorded in the report.
    pub async fn execute(&self, plan: &ReleasePlan) -> PublishReport {
        let mut report = PublishReport::pending(plan, self.registry.name(), self.dry_run);
        tracing::info!(
            cycle_id = %plan.cycle_id,
            registry = self.registry.name(),
            dry_run = self.dry_run.is_dry_run(),
            packages = plan.len(),
            "Executing release plan"
        );

        let mut published_any = false;
        for (index, release) in plan.ordered().enumerate() {
            let (state, attempts) = self
                .publish_one(release, published_any.then(|| self.config.inter_publish_delay()))
                .await;
            tracing::info!(
                package = release.package(),
                version = %release.new_version,
                state = %state,
                attempts,
                "Publish state changed"
            );
            let failed = state.is_failed();
            published_any |= state == PublishState::Published;
            if let Some(row) = report.packages.get_mut(index) {
                row.state = state;
                row.attempts = attempts;
            }
            if failed {
                tracing::warn!(
                    package = release.package(),
                    "Stopping release; remaining packages stay pending"
                );
                break;
            }
        }

        report.finished_at = Some(Utc::now());
        report
    }

    /// Publish one release. `delay` is slept right before the upload, so it
    /// only separates two actual publishes.
    async fn publish_one(
        &self,
        release: &PlannedRelease,
        delay: Option<Duration>,
    ) -> (PublishState, u32) {
        if !release.publishable {
            return (PublishState::Skipped(SkipReason::NotPublishable), 0);
        }
        if self.dry_run.is_dry_run() {
            return (PublishState::Skipped(SkipReason::DryRun), 0);
        }

        let package = release.package();
        let version = &release.new_version;

        match self
            .with_retries(package, || self.registry.exists(package, version))
            .await
        {
            (Ok(true), _) => return (PublishState::Skipped(SkipReason::AlreadyPublished), 0),
            (Ok(false), _) => {}
            (Err(err), _) => return (PublishState::Failed(err.to_string()), 0),
        }

        if let Some(delay) = delay.filter(|d| !d.is_zero()) {
            tracing::debug!(package, delay_ms = delay.as_millis(), "Waiting before publish");
            tokio::time::sleep(delay).await;
        }

        match self
            .with_retries(package, || self.registry.publish(package, version))
            .await
        {
            (Ok(PublishOutcome::Published), attempts) => (PublishState::Published, attempts),
            (Ok(PublishOutcome::AlreadySatisfied), attempts) => {
                (PublishState::Skipped(SkipReason::AlreadyPublished), attempts)
            }
            (Err(err), attempts) => (PublishState::Failed(err.to_string()), attempts),
        }
    }

    /// Run a registry call under the call timeout, retrying transient failures.
    async fn with_retries<'f, T>(
        &self,
        package: &str,
        call: impl Fn() -> RegistryFuture<'f, T>,
    ) -> (std::result::Result<T, RegistryError>, u32) {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.timed(call()).await {
                Err(err) if err.is_transient() && attempt <= self.config.max_retries => {
                    let backoff = self.config.backoff(attempt);
                    tracing::warn!(
                        package,
                        attempt,
                        backoff_ms = u64::try_from(backoff.as_millis()).unwrap_or(u64::MAX),
                        error = %err,
                        "Transient registry failure, retrying"
                    );
                    tokio::time::sleep(backoff).await;
                }
                result => return (result, attempt),
            }
        }
    }

    async fn timed<T>(
        &self,
        future: RegistryFuture<'_, T>,
    ) -> std::result::Result<T, RegistryError> {
        let timeout = self.config.call_timeout();
        tokio::time::timeout(timeout, future)
            .await
            .unwrap_or_else(|_| {
                Err(RegistryError::transient(format!(
                    "registry call timed out after {}s",
                    timeout.as_secs_f64()
                )))
            })
    }

    /// Yank a package this run published and mark it rolled back.
    ///
    /// # Errors
    ///
    /// Returns an error if the package is not in the report, is not in the
    /// [`PublishState::Published`] state, or the registry refuses the yank.
    pub async fn rollback(&self, report: &mut PublishReport, package: &str) -> Result<()> {
        let row = report
            .get_mut(package)
            .ok_or_else(|| Error::package_not_found(package))?;
        if row.state != PublishState::Published {
            return Err(Error::rollback(
                package,
                format!("state is {}", row.state),
            ));
        }
        let version = row.version.clone();

        self.timed(self.registry.yank(package, &version))
            .await
            .map_err(|e| Error::rollback(package, e.to_string()))?;

        row.state = PublishState::RolledBack;
        tracing::info!(package, version = %version, "Publish state changed to rolled back");
        Ok(())
    }
}
