//! Error types for release orchestration.

use crate::graph::CycleError;
use crate::plan::PlanError;
use miette::Diagnostic;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for release operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while planning, applying, or publishing a release.
#[derive(Error, Debug, Diagnostic)]
pub enum Error {
    /// Failed to parse or validate a version string.
    #[error("Invalid version: {version}")]
    #[diagnostic(
        code(cascade::release::invalid_version),
        help("Version must follow semantic versioning (e.g., 1.0.0, 0.2.0-alpha.1)")
    )]
    InvalidVersion {
        /// The invalid version string
        version: String,
    },

    /// Package not found in the workspace.
    #[error("Package not found: {name}")]
    #[diagnostic(
        code(cascade::release::package_not_found),
        help("Ensure the package is listed under [[packages]] in cascade.toml")
    )]
    PackageNotFound {
        /// The package id that wasn't found
        name: String,
    },

    /// The dependency graph contains a cycle.
    #[error(transparent)]
    #[diagnostic(transparent)]
    Cycle(#[from] CycleError),

    /// The release plan could not be built or failed validation.
    #[error(transparent)]
    #[diagnostic(transparent)]
    Plan(#[from] PlanError),

    /// Configuration error.
    #[error("Release configuration error: {message}")]
    #[diagnostic(code(cascade::release::config), help("{help}"))]
    Config {
        /// The error message
        message: String,
        /// Help text for the user
        help: String,
    },

    /// Manifest error (unreadable or unwritable manifest source).
    #[error("Manifest error: {message}")]
    #[diagnostic(
        code(cascade::release::manifest),
        help("Check that the manifest file exists and is properly formatted")
    )]
    Manifest {
        /// The error message
        message: String,
        /// The manifest file path
        path: Option<PathBuf>,
    },

    /// Git or commit history error.
    #[error("History error: {message}")]
    #[diagnostic(
        code(cascade::release::history),
        help("Ensure you are in a git repository and the revision marker exists")
    )]
    History {
        /// The error message
        message: String,
    },

    /// Changelog write error.
    #[error("Changelog error: {message}")]
    #[diagnostic(code(cascade::release::changelog))]
    Changelog {
        /// The error message
        message: String,
        /// The changelog path
        path: Option<PathBuf>,
        /// The underlying source error
        #[source]
        source: Option<std::io::Error>,
    },

    /// Verification of the plan failed before publishing.
    #[error("Verification failed: {message}")]
    #[diagnostic(
        code(cascade::release::verify),
        help("Fix the verifier failure and run execute again; nothing was published")
    )]
    Verify {
        /// The error message
        message: String,
    },

    /// Publish error outside of a single package's state (e.g. invalid report).
    #[error("Publish failed: {message}")]
    #[diagnostic(code(cascade::release::publish))]
    Publish {
        /// The error message
        message: String,
        /// The package involved
        package: Option<String>,
    },

    /// Rollback was requested for a package that cannot be rolled back.
    #[error("Rollback refused for {package}: {message}")]
    #[diagnostic(
        code(cascade::release::rollback),
        help("Only packages in the Published state can be yanked")
    )]
    Rollback {
        /// The error message
        message: String,
        /// The package that was targeted
        package: String,
    },

    /// Wrapped I/O error.
    #[error("I/O error: {0}")]
    #[diagnostic(code(cascade::release::io))]
    Io(#[from] std::io::Error),

    /// Wrapped JSON error.
    #[error("JSON error: {0}")]
    #[diagnostic(code(cascade::release::json))]
    Json(#[from] serde_json::Error),

    /// Wrapped TOML parsing error.
    #[error("TOML parse error: {0}")]
    #[diagnostic(code(cascade::release::toml_parse))]
    TomlParse(#[from] toml::de::Error),
}

impl Error {
    /// Create a new invalid version error.
    #[must_use]
    pub fn invalid_version(version: impl Into<String>) -> Self {
        Self::InvalidVersion {
            version: version.into(),
        }
    }

    /// Create a new package not found error.
    #[must_use]
    pub fn package_not_found(name: impl Into<String>) -> Self {
        Self::PackageNotFound { name: name.into() }
    }

    /// Create a new configuration error.
    #[must_use]
    pub fn config(message: impl Into<String>, help: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
            help: help.into(),
        }
    }

    /// Create a new manifest error.
    #[must_use]
    pub fn manifest(message: impl Into<String>, path: Option<PathBuf>) -> Self {
        Self::Manifest {
            message: message.into(),
            path,
        }
    }

    /// Create a new history error.
    #[must_use]
    pub fn history(message: impl Into<String>) -> Self {
        Self::History {
            message: message.into(),
        }
    }

    /// Create a new changelog error with source.
    #[must_use]
    pub fn changelog_with_source(
        message: impl Into<String>,
        path: Option<PathBuf>,
        source: std::io::Error,
    ) -> Self {
        Self::Changelog {
            message: message.into(),
            path,
            source: Some(source),
        }
    }

    /// Create a new verification error.
    #[must_use]
    pub fn verify(message: impl Into<String>) -> Self {
        Self::Verify {
            message: message.into(),
        }
    }

    /// Create a new publish error.
    #[must_use]
    pub fn publish(message: impl Into<String>, package: Option<String>) -> Self {
        Self::Publish {
            message: message.into(),
            package,
        }
    }

    /// Create a new rollback error.
    #[must_use]
    pub fn rollback(package: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Rollback {
            message: message.into(),
            package: package.into(),
        }
    }

    /// Whether this error is a configuration-class failure that must abort
    /// before any publish attempt.
    #[must_use]
    pub const fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::Cycle(_)
                | Self::Plan(
                    PlanError::Cycle(_)
                        | PlanError::Invalid { .. }
                        | PlanError::UnknownPackage { .. }
                )
                | Self::Config { .. }
                | Self::Manifest { .. }
                | Self::PackageNotFound { .. }
                | Self::InvalidVersion { .. }
                | Self::TomlParse(_)
        )
    }
}
