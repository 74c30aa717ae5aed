//! Commit history sources.
//!
//! A [`CommitSource`] yields the raw commits made since a revision marker,
//! oldest first. [`GitHistory`] walks a git repository with `gix`;
//! [`JsonLinesHistory`] reads pre-exported commits from a file.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::process::Command;

/// A commit as read from history, before classification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawCommit {
    /// Commit identifier (hash).
    pub id: String,
    /// Full commit message.
    pub message: String,
    /// Paths touched by the commit, relative to the repository root.
    #[serde(default)]
    pub touched_paths: Vec<PathBuf>,
}

impl RawCommit {
    /// Create a commit without path information.
    #[must_use]
    pub fn new(id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            message: message.into(),
            touched_paths: Vec::new(),
        }
    }

    /// Attach touched paths.
    #[must_use]
    pub fn with_paths<I, P>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        self.touched_paths = paths.into_iter().map(Into::into).collect();
        self
    }
}

/// Source of commits since a revision marker.
pub trait CommitSource {
    /// Return commits made after `since` (exclusive), oldest first.
    ///
    /// `None` returns the whole history.
    ///
    /// # Errors
    ///
    /// Returns a history error if the source cannot be read or the marker is unknown.
    fn commits_since(&self, since: Option<&str>) -> Result<Vec<RawCommit>>;

    /// Id of the newest commit, recorded as the revision marker on apply.
    ///
    /// # Errors
    ///
    /// Returns a history error if the source cannot be read.
    fn head_revision(&self) -> Result<Option<String>>;
}

/// Git repository history read with `gix`.
#[derive(Debug, Clone)]
pub struct GitHistory {
    root: PathBuf,
    with_paths: bool,
}

impl GitHistory {
    /// Read history of the repository at `root`.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            with_paths: true,
        }
    }

    /// Skip the per-commit `git diff-tree` call when touched paths aren't needed.
    #[must_use]
    pub const fn without_paths(mut self) -> Self {
        self.with_paths = false;
        self
    }

    /// Files changed by a commit, via `git diff-tree`.
    ///
    /// `--root` lists the files of a root commit as additions.
    fn touched_paths(&self, commit: &str) -> Result<Vec<PathBuf>> {
        let output = Command::new("git")
            .args([
                "diff-tree",
                "--no-commit-id",
                "--name-only",
                "-r",
                "--root",
                commit,
            ])
            .current_dir(&self.root)
            .output()
            .map_err(|e| Error::history(format!("Failed to run git diff-tree: {e}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::history(format!(
                "git diff-tree failed for {commit}: {stderr}"
            )));
        }

        Ok(String::from_utf8_lossy(&output.stdout)
            .lines()
            .filter(|line| !line.is_empty())
            .map(PathBuf::from)
            .collect())
    }
}

impl CommitSource for GitHistory {
    fn head_revision(&self) -> Result<Option<String>> {
        let repo = gix::open(&self.root)
            .map_err(|e| Error::history(format!("Failed to open repository: {e}")))?;
        let head = repo
            .head_id()
            .map_err(|e| Error::history(format!("Failed to get HEAD: {e}")))?;
        Ok(Some(head.to_string()))
    }

    fn commits_since(&self, since: Option<&str>) -> Result<Vec<RawCommit>> {
        let repo = gix::open(&self.root)
            .map_err(|e| Error::history(format!("Failed to open repository: {e}")))?;
        let head = repo
            .head_id()
            .map_err(|e| Error::history(format!("Failed to get HEAD: {e}")))?;

        let boundary = match since {
            Some(rev) => Some(resolve_revision(&repo, rev).ok_or_else(|| {
                Error::history(format!("Revision '{rev}' not found in repository"))
            })?),
            None => None,
        };

        // Hiding the boundary drops it and all its ancestors from every branch,
        // so commits merged in from side branches are still visited.
        // Breadth-first from HEAD keeps parent order stable for commits sharing a timestamp.
        let walk = repo
            .rev_walk([head])
            .with_hidden(boundary)
            .sorting(gix::revision::walk::Sorting::BreadthFirst)
            .all()
            .map_err(|e| Error::history(format!("Failed to create rev walk: {e}")))?;

        let mut commits = Vec::new();
        for info in walk {
            let info = info.map_err(|e| Error::history(format!("Failed to walk commits: {e}")))?;
            let commit = repo
                .find_commit(info.id)
                .map_err(|e| Error::history(format!("Failed to find commit: {e}")))?;
            let id = info.id.to_string();
            let touched_paths = if self.with_paths {
                self.touched_paths(&id)?
            } else {
                Vec::new()
            };
            commits.push(RawCommit {
                message: commit.message_raw_sloppy().to_string(),
                id,
                touched_paths,
            });
        }

        commits.reverse();
        tracing::debug!(count = commits.len(), since = ?since, "Read git history");
        Ok(commits)
    }
}

/// Resolve a tag, reference, or revision expression to a commit id.
fn resolve_revision(repo: &gix::Repository, rev: &str) -> Option<gix::ObjectId> {
    let refs = [format!("refs/tags/{rev}"), format!("refs/tags/v{rev}")];
    for name in &refs {
        if let Ok(reference) = repo.find_reference(name.as_str())
            && let Ok(id) = reference.into_fully_peeled_id()
        {
            return Some(id.detach());
        }
    }
    repo.rev_parse_single(rev).ok().map(|id| id.detach())
}

/// Commits stored one JSON object per line, oldest first.
///
/// ```text
/// {"id":"a1","message":"feat(orm): add joins","touched_paths":["orm/src/lib.rs"]}
/// ```
#[derive(Debug, Clone)]
pub struct JsonLinesHistory {
    path: PathBuf,
}

impl JsonLinesHistory {
    /// Read commits from the file at `path`.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Path of the backing file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl JsonLinesHistory {
    fn read_all(&self) -> Result<Vec<RawCommit>> {
        let content = std::fs::read_to_string(&self.path).map_err(|e| {
            Error::history(format!("Failed to read {}: {e}", self.path.display()))
        })?;

        let mut commits = Vec::new();
        for (index, line) in content.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let commit: RawCommit = serde_json::from_str(line).map_err(|e| {
                Error::history(format!(
                    "{}:{}: invalid commit record: {e}",
                    self.path.display(),
                    index + 1
                ))
            })?;
            commits.push(commit);
        }
        Ok(commits)
    }
}

impl CommitSource for JsonLinesHistory {
    fn commits_since(&self, since: Option<&str>) -> Result<Vec<RawCommit>> {
        let mut commits = self.read_all()?;
        if let Some(rev) = since {
            let position = commits
                .iter()
                .position(|c| c.id == rev)
                .ok_or_else(|| {
                    Error::history(format!(
                        "Revision '{rev}' not found in {}",
                        self.path.display()
                    ))
                })?;
            commits.drain(..=position);
        }

        Ok(commits)
    }

    fn head_revision(&self) -> Result<Option<String>> {
        Ok(self.read_all()?.pop().map(|commit| commit.id))
    }
}
