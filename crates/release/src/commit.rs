//! Conventional commit classification.
//!
//! Turns raw commit messages into [`ChangeRecord`]s. Messages are parsed
//! with `git-conventional`; headers follow the
//! `type[(scope[,scope...])][!]: description` grammar and breaking changes
//! are signalled by `!` or a `BREAKING CHANGE:` footer. Commits that do not
//! follow the grammar are rejected by [`CommitClassifier::classify`] and
//! downgraded to unscoped maintenance records by
//! [`CommitClassifier::classify_or_default`].

use crate::config::CommitsConfig;
use crate::error::{Error, Result};
use crate::history::RawCommit;
use crate::package::PackageId;
use crate::version::BumpLevel;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::collections::BTreeSet;
use std::fmt;
use std::sync::LazyLock;
use thiserror::Error;

static ISSUE_REF_RE: LazyLock<Regex> = LazyLock::new(|| {
    #[allow(clippy::unwrap_used)]
    Regex::new(r"#(\d+)\b").unwrap()
});

// Trailing "(#12)" or "(#12, #13)" suffix, as added by squash merges.
static TRAILING_REFS_RE: LazyLock<Regex> = LazyLock::new(|| {
    #[allow(clippy::unwrap_used)]
    Regex::new(r"\s*\(#\d+(?:,\s*#\d+)*\)\s*$").unwrap()
});

/// Kind of change a commit represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    /// Incompatible API change.
    Breaking,
    /// New functionality.
    Feature,
    /// Bug fix.
    Fix,
    /// Maintenance that still warrants a patch release.
    Other,
}

impl ChangeKind {
    /// Bump level this kind of change requires.
    #[must_use]
    pub const fn bump_level(self) -> BumpLevel {
        match self {
            Self::Breaking => BumpLevel::Major,
            Self::Feature => BumpLevel::Minor,
            Self::Fix | Self::Other => BumpLevel::Patch,
        }
    }
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Breaking => write!(f, "breaking"),
            Self::Feature => write!(f, "feature"),
            Self::Fix => write!(f, "fix"),
            Self::Other => write!(f, "other"),
        }
    }
}

/// A classified commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeRecord {
    /// Commit identifier.
    pub commit_id: String,
    /// Packages the change applies to; empty means repository-wide.
    pub package_scope: BTreeSet<PackageId>,
    /// What kind of change this is.
    pub change_kind: ChangeKind,
    /// Description from the header, without trailing issue references.
    pub summary: String,
    /// Issue references such as `#123`.
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub issue_refs: BTreeSet<String>,
    /// Raw commit type (`feat`, `fix`, ...), empty for defaulted records.
    #[serde(default)]
    pub commit_type: String,
    /// Matched an exclusion pattern; ignored by detection and calculation.
    #[serde(default)]
    pub excluded: bool,
}

impl ChangeRecord {
    /// Whether the record counts toward the given package.
    #[must_use]
    pub fn applies_to(&self, package: &str) -> bool {
        !self.excluded && self.package_scope.contains(package)
    }

    /// Whether the record is repository-wide.
    #[must_use]
    pub fn is_unscoped(&self) -> bool {
        self.package_scope.is_empty()
    }
}

/// Failure to classify a commit message.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClassificationError {
    /// The header does not follow the conventional grammar or uses an unknown type.
    #[error("unrecognized commit header: {header:?}")]
    UnrecognizedFormat {
        /// The offending header line.
        header: String,
    },
}

/// Classifies raw commit messages using a configured type vocabulary.
#[derive(Debug, Clone)]
pub struct CommitClassifier {
    feature_types: BTreeSet<String>,
    fix_types: BTreeSet<String>,
    other_types: BTreeSet<String>,
    exclusions: Vec<Regex>,
}

impl Default for CommitClassifier {
    fn default() -> Self {
        let config = CommitsConfig::default();
        Self {
            feature_types: lowercase_set(&config.feature_types),
            fix_types: lowercase_set(&config.fix_types),
            other_types: lowercase_set(&config.other_types),
            exclusions: config
                .exclude
                .iter()
                .filter_map(|p| Regex::new(p).ok())
                .collect(),
        }
    }
}

fn lowercase_set(types: &[String]) -> BTreeSet<String> {
    types.iter().map(|t| t.to_ascii_lowercase()).collect()
}

impl CommitClassifier {
    /// Build a classifier from configuration.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if an exclusion pattern is not a valid regex.
    pub fn new(config: &CommitsConfig) -> Result<Self> {
        let exclusions = config
            .exclude
            .iter()
            .map(|pattern| {
                Regex::new(pattern).map_err(|e| {
                    Error::config(
                        format!("Invalid commit exclusion pattern '{pattern}': {e}"),
                        "Fix the regex under [commits].exclude in cascade.toml",
                    )
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            feature_types: lowercase_set(&config.feature_types),
            fix_types: lowercase_set(&config.fix_types),
            other_types: lowercase_set(&config.other_types),
            exclusions,
        })
    }

    /// Whether a header matches any exclusion pattern.
    #[must_use]
    pub fn is_excluded(&self, header: &str) -> bool {
        self.exclusions.iter().any(|re| re.is_match(header))
    }

    fn kind_for_type(&self, commit_type: &str) -> Option<ChangeKind> {
        let lowered = commit_type.to_ascii_lowercase();
        if self.feature_types.contains(&lowered) {
            Some(ChangeKind::Feature)
        } else if self.fix_types.contains(&lowered) {
            Some(ChangeKind::Fix)
        } else if self.other_types.contains(&lowered) {
            Some(ChangeKind::Other)
        } else {
            None
        }
    }

    /// Classify a raw commit message.
    ///
    /// Excluded messages are still classified and carry `excluded = true`; an
    /// excluded message whose header is not conventional (merge commits, for
    /// instance) becomes an unscoped `Other` record rather than an error.
    ///
    /// # Errors
    ///
    /// Returns [`ClassificationError::UnrecognizedFormat`] when the header is
    /// malformed or its type is not in the vocabulary.
    pub fn classify(
        &self,
        raw_message: &str,
    ) -> std::result::Result<ChangeRecord, ClassificationError> {
        let message = raw_message.trim();
        let (header, body) = match message.split_once('\n') {
            Some((header, body)) => (header.trim(), body),
            None => (message, ""),
        };
        let excluded = self.is_excluded(header);
        let unrecognized = || {
            if excluded {
                Ok(fallback_record(header, true))
            } else {
                Err(ClassificationError::UnrecognizedFormat {
                    header: header.to_string(),
                })
            }
        };

        let header_only = compact_scope(header);
        let full = format!("{header_only}\n{body}");
        // A body the parser rejects (no blank line after the header) still
        // leaves a usable header.
        let parsed = git_conventional::Commit::parse(full.trim_end())
            .or_else(|_| git_conventional::Commit::parse(&header_only));
        let parsed = match parsed {
            Ok(parsed) => parsed,
            Err(err) => {
                tracing::trace!(header, error = %err, "Not a conventional commit");
                return unrecognized();
            }
        };

        let commit_type = parsed.type_().as_str().to_ascii_lowercase();
        let Some(kind) = self.kind_for_type(&commit_type) else {
            return unrecognized();
        };
        let change_kind = if parsed.breaking() {
            ChangeKind::Breaking
        } else {
            kind
        };

        let package_scope = parsed
            .scope()
            .map(|scope| {
                scope
                    .as_str()
                    .split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default();

        let description = parsed.description();
        let issue_refs = ISSUE_REF_RE
            .captures_iter(description)
            .chain(ISSUE_REF_RE.captures_iter(body))
            .filter_map(|c| c.get(1))
            .map(|m| format!("#{}", m.as_str()))
            .collect();
        let summary = TRAILING_REFS_RE.replace(description, "").trim().to_string();

        Ok(ChangeRecord {
            commit_id: String::new(),
            package_scope,
            change_kind,
            summary,
            issue_refs,
            commit_type,
            excluded,
        })
    }

    /// Classify a commit, falling back to an unscoped `Other` record when the
    /// message cannot be classified.
    ///
    /// When path scoping is enabled by the caller, scope inference happens
    /// afterwards in the change detector; this only attaches the commit id.
    #[must_use]
    pub fn classify_or_default(&self, commit: &RawCommit) -> ChangeRecord {
        let mut record = match self.classify(&commit.message) {
            Ok(record) => record,
            Err(err) => {
                tracing::warn!(
                    commit = %commit.id,
                    error = %err,
                    "Commit does not follow the conventional format, treating as unscoped maintenance"
                );
                let header = commit.message.trim().lines().next().unwrap_or_default();
                fallback_record(header, self.is_excluded(header))
            }
        };
        record.commit_id.clone_from(&commit.id);
        record
    }

    /// Classify a batch of commits in order.
    #[must_use]
    pub fn classify_all(&self, commits: &[RawCommit]) -> Vec<ChangeRecord> {
        commits.iter().map(|c| self.classify_or_default(c)).collect()
    }
}

/// Drop whitespace inside the scope parentheses so `fix(core, orm)` parses;
/// a scope that is only whitespace is removed.
fn compact_scope(header: &str) -> Cow<'_, str> {
    let (Some(open), Some(close)) = (header.find('('), header.find(')')) else {
        return Cow::Borrowed(header);
    };
    if close < open || header[..open].contains(':') {
        return Cow::Borrowed(header);
    }
    let scope = &header[open + 1..close];
    if !scope.is_empty() && !scope.contains(char::is_whitespace) {
        return Cow::Borrowed(header);
    }
    let compact: String = scope.chars().filter(|c| !c.is_whitespace()).collect();
    let (before, after) = (&header[..open], &header[close + 1..]);
    if compact.is_empty() {
        Cow::Owned(format!("{before}{after}"))
    } else {
        Cow::Owned(format!("{before}({compact}){after}"))
    }
}

fn fallback_record(header: &str, excluded: bool) -> ChangeRecord {
    ChangeRecord {
        commit_id: String::new(),
        package_scope: BTreeSet::new(),
        change_kind: ChangeKind::Other,
        summary: header.trim().to_string(),
        issue_refs: BTreeSet::new(),
        commit_type: String::new(),
        excluded,
    }
}

/// Classify a message with the default type vocabulary and exclusions.
///
/// # Errors
///
/// Returns [`ClassificationError::UnrecognizedFormat`] for malformed headers.
pub fn classify(raw_message: &str) -> std::result::Result<ChangeRecord, ClassificationError> {
    static DEFAULT: LazyLock<CommitClassifier> = LazyLock::new(CommitClassifier::default);
    DEFAULT.classify(raw_message)
}
