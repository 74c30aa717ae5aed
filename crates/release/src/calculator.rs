//! Per-package version bump calculation.
//!
//! Each package's primary bump is a pure fold over the records scoped to it,
//! so packages are evaluated in parallel with rayon. The returned map is the
//! barrier the cascade propagator waits on.

use crate::commit::ChangeRecord;
use crate::package::{Package, PackageId};
use crate::version::BumpLevel;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Versioning decision for one package in one release cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionDecision {
    /// Package the decision applies to.
    pub package: PackageId,
    /// Bump to apply; `None` keeps the package out of the plan.
    pub bump: BumpLevel,
    /// Records scoped to this package, in history order.
    pub triggering_records: Vec<ChangeRecord>,
    /// Whether a dependency's bump contributed to this decision.
    pub is_cascaded: bool,
    /// Direct dependencies that contributed, sorted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cascade_source: Option<Vec<PackageId>>,
}

impl VersionDecision {
    /// A decision driven only by the package's own changes.
    #[must_use]
    pub fn primary(
        package: impl Into<PackageId>,
        bump: BumpLevel,
        records: Vec<ChangeRecord>,
    ) -> Self {
        Self {
            package: package.into(),
            bump,
            triggering_records: records,
            is_cascaded: false,
            cascade_source: None,
        }
    }

    /// Whether the package will be released.
    #[must_use]
    pub fn is_release(&self) -> bool {
        self.bump.is_some()
    }

    /// Dependencies that contributed to this decision.
    #[must_use]
    pub fn sources(&self) -> &[PackageId] {
        self.cascade_source.as_deref().unwrap_or_default()
    }
}

/// Compute the bump level a package's own records call for.
///
/// Excluded records and records scoped elsewhere are ignored. For stable 0.x
/// versions a breaking change is reported as `Minor`.
#[must_use]
pub fn calculate(package: &Package, records: &[ChangeRecord]) -> BumpLevel {
    let raw = records
        .iter()
        .filter(|r| r.applies_to(&package.id))
        .map(|r| r.change_kind.bump_level())
        .fold(BumpLevel::None, std::cmp::max);
    package.current_version.adjusted_bump_level(raw)
}

/// Compute the primary decision of every package.
///
/// Packages in `changed` whose records yield no bump (a manifest-only
/// change) get a `Patch`.
#[must_use]
pub fn primary_decisions(
    packages: &[Package],
    records: &[ChangeRecord],
    changed: &BTreeSet<PackageId>,
) -> BTreeMap<PackageId, VersionDecision> {
    packages
        .par_iter()
        .map(|package| {
            let triggering: Vec<ChangeRecord> = records
                .iter()
                .filter(|r| r.applies_to(&package.id))
                .cloned()
                .collect();
            let mut bump = calculate(package, &triggering);
            if bump == BumpLevel::None && changed.contains(&package.id) {
                bump = BumpLevel::Patch;
            }
            tracing::debug!(
                package = %package.id,
                bump = %bump,
                records = triggering.len(),
                "Primary decision"
            );
            (
                package.id.clone(),
                VersionDecision::primary(package.id.clone(), bump, triggering),
            )
        })
        .collect()
}
