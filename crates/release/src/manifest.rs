//! Manifest sources.
//!
//! The orchestrator never parses ecosystem manifests itself. Packages are
//! loaded through a [`ManifestSource`]; the bundled [`WorkspaceManifest`]
//! reads the `[[packages]]` table of `cascade.toml`:
//!
//! ```toml
//! [[packages]]
//! id = "orm"
//! version = "0.1.0"
//! path = "crates/orm"              # defaults to the id
//! manifest = "crates/orm/Cargo.toml" # optional, hashed into the digest
//! dependencies = ["core"]
//! requirements = { core = "^0.1" }
//! publishable = true
//! ```
//!
//! Versions are rewritten in place with `toml_edit` so comments and layout
//! survive.

use crate::config::CONFIG_FILE;
use crate::error::{Error, Result};
use crate::package::{Package, PackageId};
use crate::version::Version;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};
use toml_edit::DocumentMut;

/// Reads packages and writes new versions.
pub trait ManifestSource {
    /// Load every package of the workspace.
    ///
    /// # Errors
    ///
    /// Returns a manifest error if the source is unreadable or invalid.
    fn load_packages(&self) -> Result<Vec<Package>>;

    /// Persist a new version for a package.
    ///
    /// # Errors
    ///
    /// Returns a manifest error if the version cannot be written.
    fn write_version(&self, package: &Package, version: &Version) -> Result<()>;

    /// Content digest of a package's manifest, excluding its version.
    ///
    /// # Errors
    ///
    /// Returns a manifest error if the manifest cannot be read.
    fn digest(&self, package: &Package) -> Result<String>;
}

#[derive(Debug, Deserialize)]
struct WorkspaceFile {
    #[serde(default)]
    packages: Vec<PackageEntry>,
}

#[derive(Debug, Deserialize)]
struct PackageEntry {
    id: PackageId,
    version: String,
    path: Option<PathBuf>,
    manifest: Option<PathBuf>,
    #[serde(default)]
    dependencies: Vec<PackageId>,
    #[serde(default)]
    requirements: BTreeMap<PackageId, String>,
    #[serde(default = "default_publishable")]
    publishable: bool,
}

const fn default_publishable() -> bool {
    true
}

/// `cascade.toml` backed manifest source.
#[derive(Debug, Clone)]
pub struct WorkspaceManifest {
    root: PathBuf,
    file: PathBuf,
}

impl WorkspaceManifest {
    /// Manifest source for the workspace at `root`, reading `root/cascade.toml`.
    #[must_use]
    pub fn new(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
            file: root.join(CONFIG_FILE),
        }
    }

    /// Read packages from a different descriptor file.
    #[must_use]
    pub fn with_file(mut self, file: impl Into<PathBuf>) -> Self {
        self.file = file.into();
        self
    }

    /// Workspace root.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn read(&self) -> Result<String> {
        fs::read_to_string(&self.file).map_err(|e| {
            Error::manifest(
                format!("Failed to read {}: {e}", self.file.display()),
                Some(self.file.clone()),
            )
        })
    }
}

impl ManifestSource for WorkspaceManifest {
    fn load_packages(&self) -> Result<Vec<Package>> {
        let content = self.read()?;
        let parsed: WorkspaceFile = toml::from_str(&content).map_err(|e| {
            Error::manifest(
                format!("Failed to parse {}: {e}", self.file.display()),
                Some(self.file.clone()),
            )
        })?;

        let mut seen = BTreeSet::new();
        let mut packages = Vec::with_capacity(parsed.packages.len());
        for entry in parsed.packages {
            if !seen.insert(entry.id.clone()) {
                return Err(Error::manifest(
                    format!("Duplicate package id '{}'", entry.id),
                    Some(self.file.clone()),
                ));
            }
            let current_version = entry.version.parse::<Version>().map_err(|_| {
                Error::manifest(
                    format!("Package '{}' has invalid version '{}'", entry.id, entry.version),
                    Some(self.file.clone()),
                )
            })?;
            let location = entry
                .manifest
                .or(entry.path)
                .unwrap_or_else(|| PathBuf::from(&entry.id));

            let mut dependencies: BTreeSet<PackageId> = entry.dependencies.into_iter().collect();
            dependencies.extend(entry.requirements.keys().cloned());
            dependencies.remove(&entry.id);

            packages.push(Package {
                manifest_location: self.root.join(location),
                id: entry.id,
                current_version,
                dependencies,
                requirements: entry.requirements,
                publishable: entry.publishable,
            });
        }

        tracing::debug!(count = packages.len(), file = %self.file.display(), "Loaded packages");
        Ok(packages)
    }

    fn write_version(&self, package: &Package, version: &Version) -> Result<()> {
        let content = self.read()?;
        let mut doc = content.parse::<DocumentMut>().map_err(|e| {
            Error::manifest(
                format!("Failed to parse {}: {e}", self.file.display()),
                Some(self.file.clone()),
            )
        })?;

        let entry = doc
            .get_mut("packages")
            .and_then(|item| item.as_array_of_tables_mut())
            .and_then(|tables| {
                tables
                    .iter_mut()
                    .find(|t| t.get("id").and_then(|v| v.as_str()) == Some(package.id.as_str()))
            })
            .ok_or_else(|| Error::package_not_found(&package.id))?;
        entry["version"] = toml_edit::value(version.to_string());

        fs::write(&self.file, doc.to_string()).map_err(|e| {
            Error::manifest(
                format!("Failed to write {}: {e}", self.file.display()),
                Some(self.file.clone()),
            )
        })?;
        tracing::debug!(package = %package.id, version = %version, "Wrote version");
        Ok(())
    }

    fn digest(&self, package: &Package) -> Result<String> {
        let mut hasher = Sha256::new();
        hasher.update(package.id.as_bytes());
        for dep in &package.dependencies {
            hasher.update(b"\0dep:");
            hasher.update(dep.as_bytes());
        }
        for (dep, req) in &package.requirements {
            hasher.update(b"\0req:");
            hasher.update(dep.as_bytes());
            hasher.update(b"=");
            hasher.update(req.as_bytes());
        }
        hasher.update(if package.publishable { b"\0pub" } else { b"\0nop" });

        if package.manifest_location.is_file() {
            let bytes = fs::read(&package.manifest_location).map_err(|e| {
                Error::manifest(
                    format!("Failed to read manifest for '{}': {e}", package.id),
                    Some(package.manifest_location.clone()),
                )
            })?;
            hasher.update(b"\0file:");
            hasher.update(&bytes);
        }

        Ok(hex::encode(hasher.finalize()))
    }
}
