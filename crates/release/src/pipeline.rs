//! End-to-end release pipeline.
//!
//! [`ReleasePipeline`] wires the stages together for one workspace:
//!
//! 1. read packages, markers and commits since the last release
//! 2. classify commits and detect changed packages
//! 3. compute primary decisions, cascade them through the graph
//! 4. render changelogs and build the [`ReleasePlan`]
//!
//! `apply` writes a plan's versions, changelogs and markers; `execute`
//! verifies and publishes it; `rollback` yanks one package of a saved run.

use crate::calculator::primary_decisions;
use crate::cascade::propagate;
use crate::changelog::{ChangelogGenerator, ChangelogSink, FileChangelogSink};
use crate::commit::CommitClassifier;
use crate::config::{CONFIG_FILE, ReleaseConfig};
use crate::detect::{PathScopes, detect_changed};
use crate::error::{Error, Result};
use crate::graph::DependencyGraph;
use crate::history::{CommitSource, GitHistory, JsonLinesHistory};
use crate::manifest::{ManifestSource, WorkspaceManifest};
use crate::markers::ReleaseMarkers;
use crate::package::{Package, PackageId};
use crate::plan::{PlanBuilder, PlanError, PlanOutcome, ReleasePlan};
use crate::publish::{DryRun, PublishReport, Publisher};
use crate::registry::{self, Registry};
use crate::verify::{self, Verifier};
use chrono::{NaiveDate, Utc};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Release pipeline for one workspace.
pub struct ReleasePipeline {
    root: PathBuf,
    config: ReleaseConfig,
    manifests: Box<dyn ManifestSource + Send + Sync>,
    commits: Box<dyn CommitSource + Send + Sync>,
    registry: Option<Arc<dyn Registry>>,
    verifier: Option<Arc<dyn Verifier>>,
    since: Option<String>,
    date: Option<NaiveDate>,
}

impl ReleasePipeline {
    /// Pipeline for the workspace at `root` with an explicit configuration.
    ///
    /// Packages come from `root/cascade.toml` and commits from the git
    /// repository at `root`.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>, config: ReleaseConfig) -> Self {
        let root = root.into();
        let mut history = GitHistory::new(&root);
        if !config.commits.scope_from_paths {
            history = history.without_paths();
        }
        Self {
            manifests: Box::new(WorkspaceManifest::new(&root)),
            commits: Box::new(history),
            root,
            config,
            registry: None,
            verifier: None,
            since: None,
            date: None,
        }
    }

    /// Load configuration from `config_path`, or `root/cascade.toml`.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the file cannot be read or parsed.
    pub fn open(root: impl Into<PathBuf>, config_path: Option<&Path>) -> Result<Self> {
        let root = root.into();
        let path = config_path.map_or_else(|| root.join(CONFIG_FILE), Path::to_path_buf);
        let config = ReleaseConfig::load(&path)?;
        let mut pipeline = Self::new(root, config);
        if config_path.is_some() {
            pipeline.manifests = Box::new(WorkspaceManifest::new(&pipeline.root).with_file(path));
        }
        Ok(pipeline)
    }

    /// Read commits from a JSON-lines file instead of git.
    #[must_use]
    pub fn with_commits_file(self, path: impl Into<PathBuf>) -> Self {
        self.with_commit_source(JsonLinesHistory::new(path))
    }

    /// Use a custom commit source.
    #[must_use]
    pub fn with_commit_source(mut self, source: impl CommitSource + Send + Sync + 'static) -> Self {
        self.commits = Box::new(source);
        self
    }

    /// Use a custom manifest source.
    #[must_use]
    pub fn with_manifest_source(
        mut self,
        source: impl ManifestSource + Send + Sync + 'static,
    ) -> Self {
        self.manifests = Box::new(source);
        self
    }

    /// Use this registry instead of the configured one.
    #[must_use]
    pub fn with_registry(mut self, registry: Arc<dyn Registry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Use this verifier instead of the configured one.
    #[must_use]
    pub fn with_verifier(mut self, verifier: Arc<dyn Verifier>) -> Self {
        self.verifier = Some(verifier);
        self
    }

    /// Read history after `revision` instead of the last recorded release.
    #[must_use]
    pub fn since(mut self, revision: Option<String>) -> Self {
        self.since = revision;
        self
    }

    /// Date used in changelog headings; defaults to today (UTC).
    #[must_use]
    pub const fn with_date(mut self, date: NaiveDate) -> Self {
        self.date = Some(date);
        self
    }

    /// Workspace root.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Active configuration.
    #[must_use]
    pub const fn config(&self) -> &ReleaseConfig {
        &self.config
    }

    /// Directory holding markers and run reports.
    #[must_use]
    pub fn state_dir(&self) -> PathBuf {
        self.root.join(&self.config.state_dir)
    }

    fn markers_path(&self) -> PathBuf {
        ReleaseMarkers::path_in(&self.state_dir())
    }

    /// Compute the release plan. Read-only.
    ///
    /// # Errors
    ///
    /// Returns an error for unreadable inputs, invalid configuration, or a
    /// dependency cycle. "Nothing to release" is
    /// [`PlanOutcome::NothingToRelease`], not an error.
    pub fn plan(&self) -> Result<PlanOutcome> {
        let packages = self.manifests.load_packages()?;
        let graph = DependencyGraph::new(&packages)?;
        let markers = ReleaseMarkers::load(&self.markers_path())?;

        let since = self.since.as_deref().or(markers.last_revision.as_deref());
        let commits = self.commits.commits_since(since)?;
        info!(commits = commits.len(), since = ?since, "Read commit history");

        let classifier = CommitClassifier::new(&self.config.commits)?;
        let mut records = classifier.classify_all(&commits);
        if self.config.commits.scope_from_paths {
            PathScopes::new(&self.root, &packages).infer(&mut records, &commits);
        }

        let changed = detect_changed(&records, &packages, &markers, self.manifests.as_ref())?;
        let primary = primary_decisions(&packages, &records, &changed);
        let decisions = propagate(&primary, &graph, self.config.cascade.policy)?;
        for decision in decisions.values().filter(|d| d.is_release()) {
            debug!(
                package = %decision.package,
                bump = %decision.bump,
                cascaded = decision.is_cascaded,
                "Final decision"
            );
        }

        let date = self.date.unwrap_or_else(|| Utc::now().date_naive());
        let generator = ChangelogGenerator::new(self.config.changelog.clone());
        let changelogs = generator.render_all(&decisions, &graph, date)?;
        let workspace_changelog = generator.render_workspace(&records, date);

        let result = PlanBuilder::new()
            .workspace_changelog(workspace_changelog)
            .build(&decisions, &graph, changelogs);
        Ok(PlanOutcome::from_result(result)?)
    }

    /// Write the plan's versions, changelogs and release markers.
    ///
    /// Packages already at their planned version are left untouched, so a
    /// plan can be applied twice.
    ///
    /// # Errors
    ///
    /// Returns an error if the plan no longer matches the workspace or a
    /// write fails.
    pub fn apply(&self, plan: &ReleasePlan) -> Result<Vec<PackageId>> {
        plan.validate()?;
        let packages = self.manifests.load_packages()?;
        let by_id: BTreeMap<&str, &Package> =
            packages.iter().map(|p| (p.id.as_str(), p)).collect();
        let sink = FileChangelogSink::new(&self.root, self.config.changelog.clone());
        let markers_path = self.markers_path();
        let mut markers = ReleaseMarkers::load(&markers_path)?;
        let revision = match self.commits.head_revision() {
            Ok(revision) => revision,
            Err(err) => {
                warn!(error = %err, "No head revision; markers will not record one");
                None
            }
        };
        let now = Utc::now();

        let mut applied = Vec::new();
        for release in plan.ordered() {
            let id = release.package();
            let package = by_id
                .get(id)
                .copied()
                .ok_or_else(|| Error::package_not_found(id))?;

            if package.current_version == release.new_version {
                debug!(package = id, version = %release.new_version, "Already applied");
            } else if package.current_version == release.current_version {
                self.manifests.write_version(package, &release.new_version)?;
                applied.push(id.to_string());
                info!(
                    package = id,
                    from = %release.current_version,
                    to = %release.new_version,
                    "Applied version"
                );
            } else {
                return Err(PlanError::Invalid {
                    message: format!(
                        "{id} is at {} but the plan was built from {}",
                        package.current_version, release.current_version
                    ),
                }
                .into());
            }

            if let Some(section) = plan.changelog_sections.get(id) {
                sink.write_section(package, section)?;
            }
            let digest = self.manifests.digest(package)?;
            markers.record(id, release.new_version.clone(), digest, revision.clone(), now);
        }

        if let Some(text) = &plan.workspace_changelog {
            sink.write_workspace(text)?;
        }
        markers.save(&markers_path)?;
        info!(
            cycle_id = %plan.cycle_id,
            applied = applied.len(),
            markers = %markers_path.display(),
            "Applied release plan"
        );
        Ok(applied)
    }

    fn registry(&self) -> Result<Arc<dyn Registry>> {
        match &self.registry {
            Some(registry) => Ok(Arc::clone(registry)),
            None => Ok(Arc::from(registry::from_config(
                &self.config.registry,
                &self.root,
            )?)),
        }
    }

    fn verifier(&self) -> Arc<dyn Verifier> {
        self.verifier.as_ref().map_or_else(
            || Arc::from(verify::from_config(&self.config.verify, &self.root)),
            Arc::clone,
        )
    }

    /// Verify and publish a plan.
    ///
    /// Failed packages are reported, not returned as errors. The report is
    /// not saved; pass it to [`ReleasePipeline::record`] for that.
    ///
    /// # Errors
    ///
    /// Returns an error if the plan is invalid, verification fails, or the
    /// registry is misconfigured.
    pub async fn execute(&self, plan: &ReleasePlan, dry_run: DryRun) -> Result<PublishReport> {
        plan.validate()?;
        let registry = self.registry()?;
        self.verifier().verify(plan).await?;

        Ok(Publisher::new(registry.as_ref(), self.config.publish.clone())
            .with_dry_run(dry_run)
            .execute(plan)
            .await)
    }

    /// Save the report of a real run to `runs/<cycle_id>.json`.
    ///
    /// A report left by an earlier run of the same cycle is merged in first,
    /// so packages published then stay `published` and can still be rolled
    /// back. Dry-run reports are not saved and yield `None`.
    ///
    /// # Errors
    ///
    /// Returns an error if the earlier report cannot be read or the report
    /// cannot be written.
    pub fn record(&self, report: &PublishReport) -> Result<Option<PathBuf>> {
        if report.dry_run {
            return Ok(None);
        }
        let path = self.report_path(&report.cycle_id);
        let mut merged = report.clone();
        if path.is_file() {
            merged.merge_earlier(&PublishReport::load(&path)?);
        }
        merged.save_to(&path)?;
        info!(path = %path.display(), failed = merged.has_failures(), "Saved run report");
        Ok(Some(path))
    }

    /// Location of the run report of a cycle.
    #[must_use]
    pub fn report_path(&self, cycle_id: &str) -> PathBuf {
        PublishReport::path_in(&self.state_dir(), cycle_id)
    }

    /// Yank one published package of a saved run and update its report.
    ///
    /// # Errors
    ///
    /// Returns an error if the report is missing, the package was not
    /// published by that run, or the registry refuses the yank.
    pub async fn rollback(&self, report_path: &Path, package: &str) -> Result<PublishReport> {
        let mut report = PublishReport::load(report_path)?;
        let registry = self.registry()?;
        Publisher::new(registry.as_ref(), self.config.publish.clone())
            .rollback(&mut report, package)
            .await?;
        report.save_to(report_path)?;
        Ok(report)
    }
}
