//! Change detection.
//!
//! A package has changed when a non-excluded record is scoped to it or its
//! manifest digest no longer matches the digest recorded at its last release.

use crate::commit::ChangeRecord;
use crate::error::Result;
use crate::history::RawCommit;
use crate::manifest::ManifestSource;
use crate::markers::ReleaseMarkers;
use crate::package::{Package, PackageId};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

/// Determine which packages changed since their last release marker.
///
/// Packages without a marker only count as changed through records, so a
/// first release is always commit driven.
///
/// # Errors
///
/// Returns an error if a manifest digest cannot be computed.
pub fn detect_changed(
    records: &[ChangeRecord],
    packages: &[Package],
    markers: &ReleaseMarkers,
    manifests: &dyn ManifestSource,
) -> Result<BTreeSet<PackageId>> {
    let mut changed = BTreeSet::new();
    for package in packages {
        if records.iter().any(|r| r.applies_to(&package.id)) {
            changed.insert(package.id.clone());
            continue;
        }
        if let Some(marker) = markers.get(&package.id) {
            let digest = manifests.digest(package)?;
            if digest != marker.manifest_digest {
                tracing::debug!(package = %package.id, "Manifest changed since last release");
                changed.insert(package.id.clone());
            }
        }
    }
    tracing::info!(changed = changed.len(), total = packages.len(), "Detected changed packages");
    Ok(changed)
}

/// Maps touched paths to the packages owning them.
///
/// A file belongs to the package with the longest directory prefix, so
/// nested packages win over their parents.
#[derive(Debug, Clone)]
pub struct PathScopes {
    directories: Vec<(PackageId, PathBuf)>,
}

impl PathScopes {
    /// Build the mapping for packages under `root`.
    #[must_use]
    pub fn new(root: &Path, packages: &[Package]) -> Self {
        let directories = packages
            .iter()
            .map(|p| {
                let dir = p.directory();
                let relative = dir.strip_prefix(root).unwrap_or(dir);
                (p.id.clone(), relative.to_path_buf())
            })
            .collect();
        Self { directories }
    }

    /// Package owning a file, if any.
    #[must_use]
    pub fn owner(&self, file: &Path) -> Option<&PackageId> {
        self.directories
            .iter()
            .filter(|(_, dir)| file.starts_with(dir))
            .max_by_key(|(_, dir)| dir.components().count())
            .map(|(id, _)| id)
    }

    /// Packages owning any of the given files.
    #[must_use]
    pub fn owners(&self, files: &[PathBuf]) -> BTreeSet<PackageId> {
        files
            .iter()
            .filter_map(|f| self.owner(f))
            .cloned()
            .collect()
    }

    /// Give unscoped records the scope of the files their commit touched.
    ///
    /// `records` and `commits` must be parallel, as produced by
    /// [`CommitClassifier::classify_all`](crate::commit::CommitClassifier::classify_all).
    pub fn infer(&self, records: &mut [ChangeRecord], commits: &[RawCommit]) {
        for (record, commit) in records.iter_mut().zip(commits) {
            if record.is_unscoped() && !record.excluded {
                record.package_scope = self.owners(&commit.touched_paths);
                if !record.package_scope.is_empty() {
                    tracing::debug!(
                        commit = %commit.id,
                        scope = ?record.package_scope,
                        "Inferred scope from touched paths"
                    );
                }
            }
        }
    }
}
