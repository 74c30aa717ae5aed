//! Filesystem directory registry.
//!
//! Each published version is a JSON record at `<root>/<package>/<version>.json`.
//! Yanking flips the record's `yanked` flag; records are never deleted.

use super::{PublishOutcome, Registry, RegistryError, RegistryFuture};
use crate::version::Version;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;

/// Record stored for each published version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishedRecord {
    /// Package id.
    pub package: String,
    /// Published version.
    pub version: Version,
    /// When the version was published.
    pub published_at: DateTime<Utc>,
    /// Whether the version was withdrawn.
    #[serde(default)]
    pub yanked: bool,
}

/// Directory-backed registry.
#[derive(Debug, Clone)]
pub struct DirectoryRegistry {
    root: PathBuf,
}

impl DirectoryRegistry {
    /// Registry rooted at `root`; the directory is created on first publish.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn record_path(&self, package: &str, version: &Version) -> PathBuf {
        self.root.join(package).join(format!("{version}.json"))
    }

    /// Read the record of a published version.
    ///
    /// # Errors
    ///
    /// Returns a rejected error if the record is missing or unreadable.
    pub async fn record(
        &self,
        package: &str,
        version: &Version,
    ) -> Result<PublishedRecord, RegistryError> {
        let path = self.record_path(package, version);
        let content = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| RegistryError::rejected(format!("{}: {e}", path.display())))?;
        serde_json::from_str(&content)
            .map_err(|e| RegistryError::rejected(format!("{}: {e}", path.display())))
    }
}

fn io_error(path: &Path, err: &std::io::Error) -> RegistryError {
    let message = format!("{}: {err}", path.display());
    match err.kind() {
        ErrorKind::Interrupted | ErrorKind::TimedOut | ErrorKind::WouldBlock => {
            RegistryError::transient(message)
        }
        _ => RegistryError::rejected(message),
    }
}

/// Scratch file next to `path` used while a record is written.
fn staging_path(path: &Path) -> PathBuf {
    let name = path.file_name().unwrap_or_default().to_string_lossy();
    path.with_file_name(format!(".{name}.{}.partial", std::process::id()))
}

/// Write `contents` to the staging file of `path`, removing it on failure.
async fn stage(path: &Path, contents: &[u8]) -> Result<PathBuf, RegistryError> {
    let staged = staging_path(path);
    let written = async {
        let mut file = tokio::fs::File::create(&staged).await?;
        file.write_all(contents).await?;
        file.sync_all().await
    }
    .await;
    if let Err(e) = written {
        let _ = tokio::fs::remove_file(&staged).await;
        return Err(io_error(&staged, &e));
    }
    Ok(staged)
}

impl Registry for DirectoryRegistry {
    fn name(&self) -> &'static str {
        "directory"
    }

    fn exists<'a>(&'a self, package: &'a str, version: &'a Version) -> RegistryFuture<'a, bool> {
        Box::pin(async move {
            let path = self.record_path(package, version);
            tokio::fs::try_exists(&path)
                .await
                .map_err(|e| io_error(&path, &e))
        })
    }

    fn publish<'a>(
        &'a self,
        package: &'a str,
        version: &'a Version,
    ) -> RegistryFuture<'a, PublishOutcome> {
        Box::pin(async move {
            let path = self.record_path(package, version);
            if let Some(parent) = path.parent() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|e| io_error(parent, &e))?;
            }
            let record = PublishedRecord {
                package: package.to_string(),
                version: version.clone(),
                published_at: Utc::now(),
                yanked: false,
            };
            let json = serde_json::to_vec_pretty(&record)
                .map_err(|e| RegistryError::rejected(e.to_string()))?;

            // The record only appears at its final path once fully written.
            let staged = stage(&path, &json).await?;
            let linked = tokio::fs::hard_link(&staged, &path).await;
            let _ = tokio::fs::remove_file(&staged).await;
            match linked {
                Ok(()) => Ok(PublishOutcome::Published),
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                    Ok(PublishOutcome::AlreadySatisfied)
                }
                Err(e) => Err(io_error(&path, &e)),
            }
        })
    }

    fn yank<'a>(&'a self, package: &'a str, version: &'a Version) -> RegistryFuture<'a, ()> {
        Box::pin(async move {
            let mut record = self.record(package, version).await?;
            record.yanked = true;
            let path = self.record_path(package, version);
            let json = serde_json::to_vec_pretty(&record)
                .map_err(|e| RegistryError::rejected(e.to_string()))?;
            let staged = stage(&path, &json).await?;
            tokio::fs::rename(&staged, &path).await.map_err(|e| {
                let _ = std::fs::remove_file(&staged);
                io_error(&path, &e)
            })
        })
    }
}
