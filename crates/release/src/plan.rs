//! Release plans.
//!
//! A [`ReleasePlan`] is the immutable, auditable output of planning: which
//! packages release, at which versions, in which order, with which
//! changelog text. It serializes to JSON so `execute` can run a plan that
//! was reviewed earlier.

use crate::calculator::VersionDecision;
use crate::changelog::ChangelogSection;
use crate::graph::{CycleError, DependencyGraph};
use crate::package::PackageId;
use crate::version::Version;
use chrono::{DateTime, Utc};
use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use thiserror::Error;

/// Failure to produce a plan.
#[derive(Debug, Error, Diagnostic)]
pub enum PlanError {
    /// No package has a non-`None` bump.
    #[error("Nothing to release")]
    #[diagnostic(
        code(cascade::release::empty_plan),
        help("No package changed since its last release")
    )]
    EmptyPlan,

    /// The dependency graph contains a cycle.
    #[error(transparent)]
    #[diagnostic(transparent)]
    Cycle(#[from] CycleError),

    /// A decision names a package outside the graph.
    #[error("Decision for unknown package: {package}")]
    #[diagnostic(code(cascade::release::plan_unknown_package))]
    UnknownPackage {
        /// The unknown package id.
        package: PackageId,
    },

    /// A planned version does not increase.
    #[error("Planned version for {package} does not increase: {current} -> {new}")]
    #[diagnostic(code(cascade::release::plan_invariant))]
    NonIncreasingVersion {
        /// The package.
        package: PackageId,
        /// Version before the release.
        current: Version,
        /// Planned version.
        new: Version,
    },

    /// A saved plan is internally inconsistent.
    #[error("Invalid release plan: {message}")]
    #[diagnostic(
        code(cascade::release::plan_invalid),
        help("Regenerate the plan with `cascade plan --out <file>`")
    )]
    Invalid {
        /// What is wrong.
        message: String,
    },
}

/// One package release within a plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlannedRelease {
    /// Decision that led to the release.
    #[serde(flatten)]
    pub decision: VersionDecision,
    /// Version before the release.
    pub current_version: Version,
    /// Version to release.
    pub new_version: Version,
    /// Whether the package is pushed to the registry.
    pub publishable: bool,
}

impl PlannedRelease {
    /// Package id.
    #[must_use]
    pub fn package(&self) -> &str {
        &self.decision.package
    }
}

/// An ordered, immutable release plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleasePlan {
    /// Deterministic identifier derived from the planned version changes.
    pub cycle_id: String,
    /// When the plan was built.
    pub created_at: DateTime<Utc>,
    /// Planned releases keyed by package.
    pub releases: BTreeMap<PackageId, PlannedRelease>,
    /// Publish order, dependencies first.
    pub publish_order: Vec<PackageId>,
    /// Rendered changelog sections keyed by package.
    #[serde(default)]
    pub changelog_sections: BTreeMap<PackageId, ChangelogSection>,
    /// Repository-wide changelog text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workspace_changelog: Option<String>,
}

impl ReleasePlan {
    /// Number of planned releases.
    #[must_use]
    pub fn len(&self) -> usize {
        self.releases.len()
    }

    /// Whether the plan releases nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.releases.is_empty()
    }

    /// Planned release of a package.
    #[must_use]
    pub fn get(&self, package: &str) -> Option<&PlannedRelease> {
        self.releases.get(package)
    }

    /// Releases in publish order.
    pub fn ordered(&self) -> impl Iterator<Item = &PlannedRelease> {
        self.publish_order.iter().filter_map(|id| self.releases.get(id))
    }

    /// Check the invariants of a plan read from outside.
    ///
    /// # Errors
    ///
    /// Returns [`PlanError::Invalid`] or [`PlanError::NonIncreasingVersion`]
    /// when the plan was edited into an inconsistent state.
    pub fn validate(&self) -> Result<(), PlanError> {
        let ordered: BTreeSet<&PackageId> = self.publish_order.iter().collect();
        if ordered.len() != self.publish_order.len() {
            return Err(PlanError::Invalid {
                message: "publish order lists a package twice".to_string(),
            });
        }
        let planned: BTreeSet<&PackageId> = self.releases.keys().collect();
        if ordered != planned {
            return Err(PlanError::Invalid {
                message: "publish order and releases name different packages".to_string(),
            });
        }
        for release in self.releases.values() {
            check_increase(release)?;
        }
        let expected = cycle_id(&self.releases);
        if expected != self.cycle_id {
            return Err(PlanError::Invalid {
                message: format!(
                    "cycle id {} does not match its releases ({expected})",
                    self.cycle_id
                ),
            });
        }
        Ok(())
    }

    /// Read a plan from a JSON file and validate it.
    ///
    /// # Errors
    ///
    /// Returns an error if the file is unreadable, malformed, or inconsistent.
    pub fn load(path: &Path) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let plan: Self = serde_json::from_str(&content)?;
        plan.validate()?;
        Ok(plan)
    }

    /// Write the plan as pretty JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn save(&self, path: &Path) -> crate::Result<()> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        let mut json = serde_json::to_string_pretty(self)?;
        json.push('\n');
        std::fs::write(path, json)?;
        Ok(())
    }
}

fn check_increase(release: &PlannedRelease) -> Result<(), PlanError> {
    if release.new_version > release.current_version {
        Ok(())
    } else {
        Err(PlanError::NonIncreasingVersion {
            package: release.package().to_string(),
            current: release.current_version.clone(),
            new: release.new_version.clone(),
        })
    }
}

/// Deterministic plan identifier: the first 16 hex characters of the
/// SHA-256 over `(package, current, new)` triples in package order.
#[must_use]
pub fn cycle_id(releases: &BTreeMap<PackageId, PlannedRelease>) -> String {
    let mut hasher = Sha256::new();
    for (id, release) in releases {
        hasher.update(id.as_bytes());
        hasher.update(b"\0");
        hasher.update(release.current_version.to_string().as_bytes());
        hasher.update(b"\0");
        hasher.update(release.new_version.to_string().as_bytes());
        hasher.update(b"\n");
    }
    let mut id = hex::encode(hasher.finalize());
    id.truncate(16);
    id
}

/// Either a plan or the distinct "nothing changed" state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlanOutcome {
    /// A plan with at least one release.
    Ready(ReleasePlan),
    /// No package needs a release.
    NothingToRelease,
}

impl PlanOutcome {
    /// Map [`PlanError::EmptyPlan`] to [`PlanOutcome::NothingToRelease`].
    ///
    /// # Errors
    ///
    /// Passes every other plan error through.
    pub fn from_result(result: Result<ReleasePlan, PlanError>) -> Result<Self, PlanError> {
        match result {
            Ok(plan) => Ok(Self::Ready(plan)),
            Err(PlanError::EmptyPlan) => Ok(Self::NothingToRelease),
            Err(err) => Err(err),
        }
    }

    /// The plan, if any.
    #[must_use]
    pub fn plan(&self) -> Option<&ReleasePlan> {
        match self {
            Self::Ready(plan) => Some(plan),
            Self::NothingToRelease => None,
        }
    }
}

/// Assembles [`ReleasePlan`]s from final decisions.
#[derive(Debug, Clone, Default)]
pub struct PlanBuilder {
    created_at: Option<DateTime<Utc>>,
    workspace_changelog: Option<String>,
}

impl PlanBuilder {
    /// Create a builder stamping plans with the current time.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a fixed creation time.
    #[must_use]
    pub const fn created_at(mut self, at: DateTime<Utc>) -> Self {
        self.created_at = Some(at);
        self
    }

    /// Attach the repository-wide changelog.
    #[must_use]
    pub fn workspace_changelog(mut self, text: Option<String>) -> Self {
        self.workspace_changelog = text;
        self
    }

    /// Build the plan.
    ///
    /// Decisions with `bump == None` are dropped. Sections for packages that
    /// are not released are ignored.
    ///
    /// # Errors
    ///
    /// Returns [`PlanError::EmptyPlan`] when nothing releases, or a cycle or
    /// invariant error.
    pub fn build(
        self,
        decisions: &BTreeMap<PackageId, VersionDecision>,
        graph: &DependencyGraph,
        changelogs: BTreeMap<PackageId, ChangelogSection>,
    ) -> Result<ReleasePlan, PlanError> {
        let mut releases = BTreeMap::new();
        for decision in decisions.values().filter(|d| d.is_release()) {
            let package = graph
                .package(&decision.package)
                .ok_or_else(|| PlanError::UnknownPackage {
                    package: decision.package.clone(),
                })?;
            let release = PlannedRelease {
                decision: decision.clone(),
                current_version: package.current_version.clone(),
                new_version: package.current_version.next(decision.bump),
                publishable: package.publishable,
            };
            check_increase(&release)?;
            releases.insert(decision.package.clone(), release);
        }

        if releases.is_empty() {
            tracing::info!("No package needs a release");
            return Err(PlanError::EmptyPlan);
        }

        let released: BTreeSet<PackageId> = releases.keys().cloned().collect();
        let publish_order = graph.topological_order(Some(&released))?;
        let changelog_sections = changelogs
            .into_iter()
            .filter(|(id, _)| released.contains(id))
            .collect();

        let plan = ReleasePlan {
            cycle_id: cycle_id(&releases),
            created_at: self.created_at.unwrap_or_else(Utc::now),
            releases,
            publish_order,
            changelog_sections,
            workspace_changelog: self.workspace_changelog,
        };
        tracing::info!(
            cycle_id = %plan.cycle_id,
            releases = plan.len(),
            order = ?plan.publish_order,
            "Built release plan"
        );
        Ok(plan)
    }
}
