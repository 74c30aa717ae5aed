//! Semantic versions and bump levels.
//!
//! This module provides:
//! - Version parsing, formatting and precedence ordering
//! - The totally ordered [`BumpLevel`] used by calculation and cascade
//! - Bump application, including the pre-release and pre-1.0 rules

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

/// Magnitude of a version increment.
///
/// Ordered `None < Patch < Minor < Major`, so `max` picks the stronger bump.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum BumpLevel {
    /// No version change.
    #[default]
    None,
    /// Patch version bump (0.0.X).
    Patch,
    /// Minor version bump (0.X.0).
    Minor,
    /// Major version bump (X.0.0).
    Major,
}

impl BumpLevel {
    /// Parse a bump level from a string.
    ///
    /// # Errors
    ///
    /// Returns an error if the string is not a valid bump level.
    pub fn parse(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "major" => Ok(Self::Major),
            "minor" => Ok(Self::Minor),
            "patch" => Ok(Self::Patch),
            "none" => Ok(Self::None),
            _ => Err(Error::config(
                format!("Invalid bump level: {s}"),
                "Expected major, minor, patch, or none",
            )),
        }
    }

    /// Whether this level changes the version at all.
    #[must_use]
    pub fn is_some(self) -> bool {
        self != Self::None
    }
}

impl fmt::Display for BumpLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => write!(f, "none"),
            Self::Patch => write!(f, "patch"),
            Self::Minor => write!(f, "minor"),
            Self::Major => write!(f, "major"),
        }
    }
}

/// Pre-release suffix of a version, e.g. `alpha.2`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PreRelease {
    /// Label of the pre-release line (`alpha`, `beta`, `rc`).
    pub identifier: String,
    /// Position within the line.
    pub ordinal: u64,
}

impl PreRelease {
    /// Create a new pre-release suffix.
    #[must_use]
    pub fn new(identifier: impl Into<String>, ordinal: u64) -> Self {
        Self {
            identifier: identifier.into(),
            ordinal,
        }
    }

    fn parse(s: &str) -> Result<Self> {
        if s.is_empty() {
            return Err(Error::invalid_version(format!("empty pre-release in {s}")));
        }
        if let Some((identifier, ordinal)) = s.rsplit_once('.')
            && let Ok(ordinal) = ordinal.parse::<u64>()
        {
            return Ok(Self::new(identifier, ordinal));
        }
        Ok(Self::new(s, 0))
    }
}

// The ordinal is always written, so a bare `rc` label reads back as `rc.0`.
impl fmt::Display for PreRelease {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.identifier, self.ordinal)
    }
}

impl PartialOrd for PreRelease {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for PreRelease {
    fn cmp(&self, other: &Self) -> Ordering {
        self.identifier
            .cmp(&other.identifier)
            .then(self.ordinal.cmp(&other.ordinal))
    }
}

/// A semantic version.
///
/// Build metadata is accepted when parsing and discarded; it never takes
/// part in precedence.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Version {
    /// Major version number.
    pub major: u64,
    /// Minor version number.
    pub minor: u64,
    /// Patch version number.
    pub patch: u64,
    /// Pre-release suffix, if this is an unstable version.
    pub pre_release: Option<PreRelease>,
}

impl Version {
    /// Create a new stable version.
    #[must_use]
    pub const fn new(major: u64, minor: u64, patch: u64) -> Self {
        Self {
            major,
            minor,
            patch,
            pre_release: None,
        }
    }

    /// Attach a pre-release suffix.
    #[must_use]
    pub fn with_pre_release(mut self, identifier: impl Into<String>, ordinal: u64) -> Self {
        self.pre_release = Some(PreRelease::new(identifier, ordinal));
        self
    }

    /// Check if this is a pre-release version.
    #[must_use]
    pub fn is_pre_release(&self) -> bool {
        self.pre_release.is_some()
    }

    /// Check if this is the initial development version (0.x.x).
    #[must_use]
    pub fn is_initial_development(&self) -> bool {
        self.major == 0
    }

    /// Get the bump level to report for this version.
    ///
    /// Stable 0.x.x versions may carry breaking changes in a minor bump, so
    /// `Major` is reported as `Minor`. Pre-release and 1.0+ versions keep the
    /// level unchanged.
    #[must_use]
    pub fn adjusted_bump_level(&self, bump: BumpLevel) -> BumpLevel {
        if !self.is_pre_release() && self.is_initial_development() && bump == BumpLevel::Major {
            BumpLevel::Minor
        } else {
            bump
        }
    }

    /// Apply a bump level to this version.
    ///
    /// A pre-release version only has its ordinal incremented, whatever the
    /// level; the major/minor/patch slots stay reserved until stabilization.
    #[must_use]
    pub fn bump(&self, bump: BumpLevel) -> Self {
        if bump == BumpLevel::None {
            return self.clone();
        }
        if let Some(pre) = &self.pre_release {
            let mut next = self.clone();
            next.pre_release = Some(PreRelease::new(pre.identifier.clone(), pre.ordinal + 1));
            return next;
        }
        match bump {
            BumpLevel::Major => Self::new(self.major + 1, 0, 0),
            BumpLevel::Minor => Self::new(self.major, self.minor + 1, 0),
            BumpLevel::Patch => Self::new(self.major, self.minor, self.patch + 1),
            BumpLevel::None => self.clone(),
        }
    }

    /// Version a release at `bump` produces.
    ///
    /// Applies [`Self::adjusted_bump_level`] before [`Self::bump`], so a
    /// stable 0.x version never jumps to 1.0.0 through a cascade.
    #[must_use]
    pub fn next(&self, bump: BumpLevel) -> Self {
        self.bump(self.adjusted_bump_level(bump))
    }

    /// Convert to a `semver::Version` for requirement matching.
    ///
    /// # Errors
    ///
    /// Returns an error if the pre-release identifier is not valid semver.
    pub fn to_semver(&self) -> Result<semver::Version> {
        semver::Version::parse(&self.to_string())
            .map_err(|e| Error::invalid_version(format!("{self}: {e}")))
    }
}

impl Default for Version {
    fn default() -> Self {
        Self::new(0, 0, 0)
    }
}

impl FromStr for Version {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        let s = s.strip_prefix('v').unwrap_or(s);

        let version_pre = s.split_once('+').map_or(s, |(v, _)| v);

        let (core, pre_release) = match version_pre.split_once('-') {
            Some((v, p)) => (v, Some(PreRelease::parse(p)?)),
            None => (version_pre, None),
        };

        let parts: Vec<&str> = core.split('.').collect();
        if parts.len() != 3 {
            return Err(Error::invalid_version(s));
        }

        let major = parts[0]
            .parse()
            .map_err(|_| Error::invalid_version(format!("Invalid major version: {}", parts[0])))?;
        let minor = parts[1]
            .parse()
            .map_err(|_| Error::invalid_version(format!("Invalid minor version: {}", parts[1])))?;
        let patch = parts[2]
            .parse()
            .map_err(|_| Error::invalid_version(format!("Invalid patch version: {}", parts[2])))?;

        Ok(Self {
            major,
            minor,
            patch,
            pre_release,
        })
    }
}

impl TryFrom<String> for Version {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<Version> for String {
    fn from(value: Version) -> Self {
        value.to_string()
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)?;
        if let Some(ref pre) = self.pre_release {
            write!(f, "-{pre}")?;
        }
        Ok(())
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        self.major
            .cmp(&other.major)
            .then(self.minor.cmp(&other.minor))
            .then(self.patch.cmp(&other.patch))
            .then_with(|| match (&self.pre_release, &other.pre_release) {
                (None, None) => Ordering::Equal,
                (Some(_), None) => Ordering::Less,
                (None, Some(_)) => Ordering::Greater,
                (Some(a), Some(b)) => a.cmp(b),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_next_applies_adjustment() {
        assert_eq!(Version::new(0, 3, 1).next(BumpLevel::Major), Version::new(0, 4, 0));
        assert_eq!(Version::new(1, 3, 1).next(BumpLevel::Major), Version::new(2, 0, 0));
        assert_eq!(Version::new(1, 3, 1).next(BumpLevel::None), Version::new(1, 3, 1));
        let alpha = Version::new(0, 1, 0).with_pre_release("alpha", 2);
        assert_eq!(
            alpha.next(BumpLevel::Major),
            Version::new(0, 1, 0).with_pre_release("alpha", 3)
        );
    }

    #[test]
    fn test_version_parse() {
        let v: Version = "1.2.3".parse().unwrap();
        assert_eq!(v, Version::new(1, 2, 3));

        let v: Version = "v1.2.3".parse().unwrap();
        assert_eq!(v, Version::new(1, 2, 3));

        let v: Version = "0.1.0-alpha.2".parse().unwrap();
        assert_eq!(v, Version::new(0, 1, 0).with_pre_release("alpha", 2));

        let v: Version = "1.0.0-rc".parse().unwrap();
        assert_eq!(v.pre_release, Some(PreRelease::new("rc", 0)));

        let v: Version = "1.2.3+build.123".parse().unwrap();
        assert_eq!(v, Version::new(1, 2, 3));
    }

    #[test]
    fn test_version_parse_invalid() {
        assert!("1.2".parse::<Version>().is_err());
        assert!("1.2.3.4".parse::<Version>().is_err());
        assert!("a.b.c".parse::<Version>().is_err());
        assert!("1.0.0-".parse::<Version>().is_err());
    }

    #[test]
    fn test_version_display() {
        assert_eq!(Version::new(1, 2, 3).to_string(), "1.2.3");
        assert_eq!(
            Version::new(0, 1, 0)
                .with_pre_release("alpha", 3)
                .to_string(),
            "0.1.0-alpha.3"
        );
        assert_eq!(
            Version::new(1, 0, 0).with_pre_release("rc", 0).to_string(),
            "1.0.0-rc.0"
        );
    }

    #[test]
    fn test_version_display_parses_back() {
        for text in ["1.0.0-rc.0", "0.1.0-alpha.3", "2.0.0", "1.0.0-pre.release.4"] {
            let v: Version = text.parse().unwrap();
            assert_eq!(v.to_string(), text);
            assert_eq!(v.to_string().parse::<Version>().unwrap(), v);
        }
        // A bare label is read as ordinal 0 and written with it.
        let bare: Version = "1.0.0-rc".parse().unwrap();
        assert_eq!(bare.to_string(), "1.0.0-rc.0");
    }

    #[test]
    fn test_version_bump_stable() {
        let v = Version::new(1, 2, 3);
        assert_eq!(v.bump(BumpLevel::Patch), Version::new(1, 2, 4));
        assert_eq!(v.bump(BumpLevel::Minor), Version::new(1, 3, 0));
        assert_eq!(v.bump(BumpLevel::Major), Version::new(2, 0, 0));
        assert_eq!(v.bump(BumpLevel::None), Version::new(1, 2, 3));
    }

    #[test]
    fn test_version_bump_pre_release_only_increments_ordinal() {
        let v = Version::new(0, 1, 0).with_pre_release("alpha", 2);
        let expected = Version::new(0, 1, 0).with_pre_release("alpha", 3);
        assert_eq!(v.bump(BumpLevel::Major), expected);
        assert_eq!(v.bump(BumpLevel::Minor), expected);
        assert_eq!(v.bump(BumpLevel::Patch), expected);
        assert_eq!(v.bump(BumpLevel::None), v);
    }

    #[test]
    fn test_version_ordering() {
        assert!(Version::new(2, 0, 0) > Version::new(1, 0, 0));
        assert!(Version::new(1, 1, 0) > Version::new(1, 0, 0));
        assert!(Version::new(1, 0, 1) > Version::new(1, 0, 0));

        // Pre-release has lower precedence than its release
        assert!(Version::new(1, 0, 0) > Version::new(1, 0, 0).with_pre_release("alpha", 9));
        // Same label orders by ordinal, numerically
        assert!(
            Version::new(1, 0, 0).with_pre_release("alpha", 10)
                > Version::new(1, 0, 0).with_pre_release("alpha", 9)
        );
    }

    #[test]
    fn test_adjusted_bump_level_pre_1_0() {
        let v = Version::new(0, 16, 0);
        assert_eq!(v.adjusted_bump_level(BumpLevel::Major), BumpLevel::Minor);
        assert_eq!(v.adjusted_bump_level(BumpLevel::Minor), BumpLevel::Minor);
        assert_eq!(v.adjusted_bump_level(BumpLevel::Patch), BumpLevel::Patch);
        assert_eq!(v.adjusted_bump_level(BumpLevel::None), BumpLevel::None);
    }

    #[test]
    fn test_adjusted_bump_level_post_1_0() {
        let v = Version::new(2, 5, 3);
        assert_eq!(v.adjusted_bump_level(BumpLevel::Major), BumpLevel::Major);
    }

    #[test]
    fn test_bump_level_ordering_and_parse() {
        assert!(BumpLevel::Major > BumpLevel::Minor);
        assert!(BumpLevel::Minor > BumpLevel::Patch);
        assert!(BumpLevel::Patch > BumpLevel::None);
        assert_eq!(BumpLevel::parse("MINOR").unwrap(), BumpLevel::Minor);
        assert!(BumpLevel::parse("huge").is_err());
    }

    #[test]
    fn test_version_serde_as_string() {
        let v = Version::new(0, 1, 0).with_pre_release("beta", 1);
        let json = serde_json::to_string(&v).unwrap();
        assert_eq!(json, "\"0.1.0-beta.1\"");
        let back: Version = serde_json::from_str(&json).unwrap();
        assert_eq!(back, v);
    }

    #[test]
    fn test_to_semver() {
        let v = Version::new(1, 2, 0).with_pre_release("rc", 1);
        let sv = v.to_semver().unwrap();
        assert_eq!(sv.to_string(), "1.2.0-rc.1");
    }
}
