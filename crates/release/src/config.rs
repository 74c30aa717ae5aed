//! Release configuration types.
//!
//! This module defines the Rust representations of the release configuration
//! read from `cascade.toml`. Every section is optional and falls back to its
//! defaults; the `[[packages]]` table of the same file is read separately by
//! the manifest source.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default configuration file name at the workspace root.
pub const CONFIG_FILE: &str = "cascade.toml";

/// How a dependency's version bump reaches its dependents.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CascadePolicy {
    /// Any bump of a dependency triggers cascade evaluation (default).
    #[default]
    Always,

    /// Cascade only when the dependent's declared requirement no longer
    /// matches the dependency's new version. Edges without a declared
    /// requirement behave as [`CascadePolicy::Always`].
    Requirement,
}

impl fmt::Display for CascadePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Always => write!(f, "always"),
            Self::Requirement => write!(f, "requirement"),
        }
    }
}

/// Complete release configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReleaseConfig {
    /// Commit classification settings.
    pub commits: CommitsConfig,
    /// Cascade settings.
    pub cascade: CascadeConfig,
    /// Changelog generation configuration.
    pub changelog: ChangelogConfig,
    /// Publisher settings.
    pub publish: PublishConfig,
    /// Registry adapter selection.
    pub registry: RegistryConfig,
    /// Verifier invoked before publishing.
    pub verify: VerifyConfig,
    /// Directory for release markers and run reports, relative to the root.
    #[serde(rename = "stateDir")]
    pub state_dir: PathBuf,
}

impl Default for ReleaseConfig {
    fn default() -> Self {
        Self {
            commits: CommitsConfig::default(),
            cascade: CascadeConfig::default(),
            changelog: ChangelogConfig::default(),
            publish: PublishConfig::default(),
            registry: RegistryConfig::default(),
            verify: VerifyConfig::default(),
            state_dir: PathBuf::from(".cascade"),
        }
    }
}

impl ReleaseConfig {
    /// Load configuration from a `cascade.toml` file.
    ///
    /// A missing file yields the default configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "No config file, using defaults");
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::config(
                format!("Failed to read {}: {e}", path.display()),
                "Check that the configuration file is readable",
            )
        })?;
        Self::from_toml(&content)
    }

    /// Parse configuration from TOML text.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML is malformed or has invalid values.
    pub fn from_toml(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }
}

/// Commit classification configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CommitsConfig {
    /// Types that add features.
    #[serde(rename = "featureTypes")]
    pub feature_types: Vec<String>,
    /// Types that fix bugs.
    #[serde(rename = "fixTypes")]
    pub fix_types: Vec<String>,
    /// Recognized maintenance types.
    #[serde(rename = "otherTypes")]
    pub other_types: Vec<String>,
    /// Regexes matched against the header; matching commits are excluded.
    pub exclude: Vec<String>,
    /// Infer the scope of unscoped commits from the paths they touch.
    #[serde(rename = "scopeFromPaths")]
    pub scope_from_paths: bool,
}

impl Default for CommitsConfig {
    fn default() -> Self {
        Self {
            feature_types: vec!["feat".to_string()],
            fix_types: vec!["fix".to_string(), "perf".to_string()],
            other_types: [
                "build", "chore", "ci", "docs", "refactor", "revert", "style", "test",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            exclude: vec![
                r"^Merge (branch|pull request|remote-tracking branch) ".to_string(),
                r"^chore\(release\)".to_string(),
                r#"^Revert "Revert "#.to_string(),
            ],
            scope_from_paths: false,
        }
    }
}

/// Cascade configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CascadeConfig {
    /// Policy deciding which dependency bumps reach dependents.
    pub policy: CascadePolicy,
}

/// Changelog generation configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChangelogConfig {
    /// Path to the CHANGELOG file relative to the package directory.
    pub path: String,
    /// Whether to write changelogs for each package.
    #[serde(rename = "perPackage")]
    pub per_package: bool,
    /// Whether to write a root changelog for repository-wide commits.
    pub workspace: bool,
    /// Bullets copied from a dependency into a dependent's "Dependency Updates" (1-3).
    #[serde(rename = "representativeBullets")]
    pub representative_bullets: usize,
}

impl Default for ChangelogConfig {
    fn default() -> Self {
        Self {
            path: "CHANGELOG.md".to_string(),
            per_package: true,
            workspace: true,
            representative_bullets: 3,
        }
    }
}

impl ChangelogConfig {
    /// Representative bullet count clamped to the supported 1..=3 range.
    #[must_use]
    pub fn bullet_limit(&self) -> usize {
        self.representative_bullets.clamp(1, 3)
    }
}

/// Publisher configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PublishConfig {
    /// Per registry call timeout in seconds.
    #[serde(rename = "callTimeoutSecs")]
    pub call_timeout_secs: u64,
    /// Delay between successive successful publishes, in milliseconds.
    #[serde(rename = "interPublishDelayMs")]
    pub inter_publish_delay_ms: u64,
    /// Retries for transient registry failures.
    #[serde(rename = "maxRetries")]
    pub max_retries: u32,
    /// Initial backoff between retries, doubled after each attempt.
    #[serde(rename = "retryBackoffMs")]
    pub retry_backoff_ms: u64,
}

impl Default for PublishConfig {
    fn default() -> Self {
        Self {
            call_timeout_secs: 120,
            inter_publish_delay_ms: 0,
            max_retries: 2,
            retry_backoff_ms: 500,
        }
    }
}

impl PublishConfig {
    /// Timeout applied to every registry call.
    #[must_use]
    pub const fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.call_timeout_secs)
    }

    /// Delay before a publish that follows a successful one.
    #[must_use]
    pub const fn inter_publish_delay(&self) -> Duration {
        Duration::from_millis(self.inter_publish_delay_ms)
    }

    /// Backoff before the given retry attempt (1-based).
    #[must_use]
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u64.saturating_pow(attempt.saturating_sub(1));
        Duration::from_millis(self.retry_backoff_ms.saturating_mul(factor))
    }
}

/// Registry adapter kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RegistryKind {
    /// Filesystem directory registry.
    #[default]
    Directory,
    /// Operator-configured shell commands.
    Command,
}

/// Registry adapter configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Which adapter to use.
    pub kind: RegistryKind,
    /// Root directory for the directory registry, relative to the workspace root.
    pub path: PathBuf,
    /// Command template checking for an existing version (exit 0 = exists).
    pub exists: Vec<String>,
    /// Command template publishing a version.
    pub publish: Vec<String>,
    /// Command template yanking a version.
    pub yank: Vec<String>,
    /// Regex matched against publish stderr meaning "version already exists".
    #[serde(rename = "alreadyExistsPattern")]
    pub already_exists_pattern: String,
    /// Regex matched against command stderr marking a failure as retryable.
    #[serde(rename = "transientPattern")]
    pub transient_pattern: String,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            kind: RegistryKind::Directory,
            path: PathBuf::from(".cascade/registry"),
            exists: Vec::new(),
            publish: Vec::new(),
            yank: Vec::new(),
            already_exists_pattern: "(?i)already (exists|uploaded|published)".to_string(),
            transient_pattern:
                "(?i)(timed? ?out|temporar|rate.?limit|too many requests|connection (reset|refused)|50[234])"
                    .to_string(),
        }
    }
}

/// Verifier configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct VerifyConfig {
    /// Command run once before publishing; empty disables verification.
    pub command: Vec<String>,
}
