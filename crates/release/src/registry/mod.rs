//! Package registries.
//!
//! This module defines the [`Registry`] trait the publisher drives. Methods
//! return boxed futures so implementations stay object safe and can be
//! selected at runtime from configuration.
//!
//! Bundled adapters:
//! - [`DirectoryRegistry`] - one JSON record per published version on disk
//! - [`CommandRegistry`] - operator-configured shell commands
//! - [`MemoryRegistry`] - in-process registry with fault injection
//!
//! # Example
//!
//! ```rust,ignore
//! use cascade_release::registry::{PublishOutcome, Registry, RegistryFuture};
//! use cascade_release::Version;
//!
//! struct MyRegistry;
//!
//! impl Registry for MyRegistry {
//!     fn name(&self) -> &'static str { "my-registry" }
//!
//!     fn exists<'a>(&'a self, package: &'a str, version: &'a Version) -> RegistryFuture<'a, bool> {
//!         Box::pin(async move { Ok(false) })
//!     }
//!
//!     fn publish<'a>(&'a self, package: &'a str, version: &'a Version) -> RegistryFuture<'a, PublishOutcome> {
//!         Box::pin(async move { Ok(PublishOutcome::Published) })
//!     }
//!
//!     fn yank<'a>(&'a self, package: &'a str, version: &'a Version) -> RegistryFuture<'a, ()> {
//!         Box::pin(async move { Ok(()) })
//!     }
//! }
//! ```

mod command;
mod directory;
mod memory;

pub use command::CommandRegistry;
pub use directory::{DirectoryRegistry, PublishedRecord};
pub use memory::MemoryRegistry;

use crate::config::{RegistryConfig, RegistryKind};
use crate::error::Result;
use crate::version::Version;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::path::Path;
use std::pin::Pin;
use thiserror::Error;

/// Boxed future returned by [`Registry`] methods.
pub type RegistryFuture<'a, T> =
    Pin<Box<dyn Future<Output = std::result::Result<T, RegistryError>> + Send + 'a>>;

/// Successful publish outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PublishOutcome {
    /// The version was uploaded by this call.
    Published,
    /// The registry already had this version; nothing was uploaded.
    AlreadySatisfied,
}

/// Whether a registry failure may succeed on retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegistryErrorKind {
    /// Network blips, rate limits, timeouts.
    Transient,
    /// The registry refused the request.
    Rejected,
}

impl fmt::Display for RegistryErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transient => write!(f, "transient"),
            Self::Rejected => write!(f, "rejected"),
        }
    }
}

/// Registry call failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind} registry error: {message}")]
pub struct RegistryError {
    /// Failure class.
    pub kind: RegistryErrorKind,
    /// Human-readable detail.
    pub message: String,
}

impl RegistryError {
    /// A failure worth retrying.
    #[must_use]
    pub fn transient(message: impl Into<String>) -> Self {
        Self {
            kind: RegistryErrorKind::Transient,
            message: message.into(),
        }
    }

    /// A permanent failure.
    #[must_use]
    pub fn rejected(message: impl Into<String>) -> Self {
        Self {
            kind: RegistryErrorKind::Rejected,
            message: message.into(),
        }
    }

    /// Whether the publisher should retry.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        self.kind == RegistryErrorKind::Transient
    }
}

/// A package registry.
pub trait Registry: Send + Sync {
    /// Returns the name of this registry adapter.
    fn name(&self) -> &'static str;

    /// Whether the registry already has `package` at `version`, yanked or not.
    fn exists<'a>(&'a self, package: &'a str, version: &'a Version) -> RegistryFuture<'a, bool>;

    /// Upload `package` at `version`.
    fn publish<'a>(
        &'a self,
        package: &'a str,
        version: &'a Version,
    ) -> RegistryFuture<'a, PublishOutcome>;

    /// Mark a published version as withdrawn. The version is never reused.
    fn yank<'a>(&'a self, package: &'a str, version: &'a Version) -> RegistryFuture<'a, ()>;
}

/// Build the registry selected by configuration.
///
/// Relative directory paths are resolved against `root`.
///
/// # Errors
///
/// Returns a configuration error if the command registry is misconfigured.
pub fn from_config(config: &RegistryConfig, root: &Path) -> Result<Box<dyn Registry>> {
    match config.kind {
        RegistryKind::Directory => {
            let path = if config.path.is_absolute() {
                config.path.clone()
            } else {
                root.join(&config.path)
            };
            Ok(Box::new(DirectoryRegistry::new(path)))
        }
        RegistryKind::Command => Ok(Box::new(CommandRegistry::from_config(config, root)?)),
    }
}
