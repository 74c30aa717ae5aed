//! Workspace package model.

use crate::version::Version;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

/// Unique package identifier within a workspace.
pub type PackageId = String;

/// A releasable package, loaded once per release cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Package {
    /// Unique identifier.
    pub id: PackageId,
    /// Version currently recorded in the manifest source.
    pub current_version: Version,
    /// Opaque handle to the package manifest (a file path for the bundled adapters).
    pub manifest_location: PathBuf,
    /// Ids of packages this package depends on.
    pub dependencies: BTreeSet<PackageId>,
    /// Declared version requirements for some dependencies, e.g. `^1.2`.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub requirements: BTreeMap<PackageId, String>,
    /// Whether the package is pushed to the registry.
    pub publishable: bool,
}

impl Package {
    /// Create a publishable package with no dependencies.
    #[must_use]
    pub fn new(id: impl Into<PackageId>, current_version: Version) -> Self {
        let id = id.into();
        Self {
            manifest_location: PathBuf::from(&id),
            id,
            current_version,
            dependencies: BTreeSet::new(),
            requirements: BTreeMap::new(),
            publishable: true,
        }
    }

    /// Add dependencies by id.
    #[must_use]
    pub fn with_dependencies<I, S>(mut self, deps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<PackageId>,
    {
        self.dependencies.extend(deps.into_iter().map(Into::into));
        self
    }

    /// Declare a version requirement on a dependency.
    #[must_use]
    pub fn with_requirement(mut self, dep: impl Into<PackageId>, req: impl Into<String>) -> Self {
        let dep = dep.into();
        self.dependencies.insert(dep.clone());
        self.requirements.insert(dep, req.into());
        self
    }

    /// Set the manifest location.
    #[must_use]
    pub fn with_manifest(mut self, location: impl Into<PathBuf>) -> Self {
        self.manifest_location = location.into();
        self
    }

    /// Mark the package as not publishable.
    #[must_use]
    pub const fn unpublished(mut self) -> Self {
        self.publishable = false;
        self
    }

    /// Directory owning the package's files.
    ///
    /// The manifest's parent directory when the location names a file, the
    /// location itself otherwise.
    #[must_use]
    pub fn directory(&self) -> &Path {
        if self.manifest_location.extension().is_some() {
            self.manifest_location
                .parent()
                .unwrap_or(&self.manifest_location)
        } else {
            &self.manifest_location
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder() {
        let pkg = Package::new("web", Version::new(0, 1, 0))
            .with_dependencies(["orm"])
            .with_requirement("core", "^0.1")
            .unpublished();

        assert_eq!(pkg.id, "web");
        assert!(pkg.dependencies.contains("orm"));
        assert!(pkg.dependencies.contains("core"));
        assert_eq!(pkg.requirements.get("core").map(String::as_str), Some("^0.1"));
        assert!(!pkg.publishable);
    }

    #[test]
    fn test_directory_from_manifest_file() {
        let pkg = Package::new("web", Version::new(0, 1, 0)).with_manifest("crates/web/Cargo.toml");
        assert_eq!(pkg.directory(), Path::new("crates/web"));

        let pkg = Package::new("web", Version::new(0, 1, 0)).with_manifest("crates/web");
        assert_eq!(pkg.directory(), Path::new("crates/web"));
    }
}
