//! Release markers.
//!
//! `apply` records, per package, the version it released, the manifest
//! digest at that point, and the revision the release was cut from. The
//! change detector compares digests against these markers and the pipeline
//! reads history since the last recorded revision.

use crate::error::{Error, Result};
use crate::package::PackageId;
use crate::version::Version;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Marker file name inside the state directory.
pub const MARKERS_FILE: &str = "markers.json";

/// Release marker for one package.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseMarker {
    /// Version released.
    pub version: Version,
    /// Manifest digest when the release was applied.
    pub manifest_digest: String,
    /// Revision the release was cut from, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revision: Option<String>,
    /// When the release was applied.
    pub released_at: DateTime<Utc>,
}

/// All release markers of a workspace.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseMarkers {
    /// Revision of the most recent applied release.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_revision: Option<String>,
    /// Markers keyed by package.
    #[serde(default)]
    pub packages: BTreeMap<PackageId, ReleaseMarker>,
}

impl ReleaseMarkers {
    /// Location of the marker file under a state directory.
    #[must_use]
    pub fn path_in(state_dir: &Path) -> PathBuf {
        state_dir.join(MARKERS_FILE)
    }

    /// Load markers, returning an empty set when the file does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        serde_json::from_str(&content).map_err(|e| {
            Error::config(
                format!("Invalid release markers in {}: {e}", path.display()),
                "Restore the marker file from version control or delete it to start over",
            )
        })
    }

    /// Write markers as pretty JSON, creating the parent directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut json = serde_json::to_string_pretty(self)?;
        json.push('\n');
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Marker for a package.
    #[must_use]
    pub fn get(&self, package: &str) -> Option<&ReleaseMarker> {
        self.packages.get(package)
    }

    /// Record a release of a package.
    pub fn record(
        &mut self,
        package: impl Into<PackageId>,
        version: Version,
        manifest_digest: impl Into<String>,
        revision: Option<String>,
        released_at: DateTime<Utc>,
    ) {
        if revision.is_some() {
            self.last_revision.clone_from(&revision);
        }
        self.packages.insert(
            package.into(),
            ReleaseMarker {
                version,
                manifest_digest: manifest_digest.into(),
                revision,
                released_at,
            },
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_load_missing_is_empty() {
        let temp = TempDir::new().unwrap();
        let markers = ReleaseMarkers::load(&ReleaseMarkers::path_in(temp.path())).unwrap();
        assert!(markers.packages.is_empty());
        assert!(markers.last_revision.is_none());
    }

    #[test]
    fn test_record_save_load() {
        let temp = TempDir::new().unwrap();
        let path = ReleaseMarkers::path_in(&temp.path().join(".cascade"));

        let mut markers = ReleaseMarkers::default();
        markers.record(
            "core",
            Version::new(0, 2, 0),
            "abc",
            Some("deadbeef".to_string()),
            Utc::now(),
        );
        markers.save(&path).unwrap();

        let loaded = ReleaseMarkers::load(&path).unwrap();
        assert_eq!(loaded, markers);
        assert_eq!(loaded.last_revision.as_deref(), Some("deadbeef"));
        assert_eq!(loaded.get("core").unwrap().version, Version::new(0, 2, 0));
    }

    #[test]
    fn test_record_without_revision_keeps_last() {
        let mut markers = ReleaseMarkers::default();
        markers.record("a", Version::new(1, 0, 0), "d1", Some("r1".to_string()), Utc::now());
        markers.record("b", Version::new(1, 0, 0), "d2", None, Utc::now());
        assert_eq!(markers.last_revision.as_deref(), Some("r1"));
    }

    #[test]
    fn test_load_invalid_is_config_error() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join(MARKERS_FILE);
        std::fs::write(&path, "not json").unwrap();
        let err = ReleaseMarkers::load(&path).unwrap_err();
        assert!(err.is_configuration());
    }
}
