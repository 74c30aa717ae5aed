//! Release orchestration for multi-package workspaces.
//!
//! This crate turns a commit history into an ordered, auditable release
//! plan and publishes it. Packages that depend on a released package are
//! bumped with it, so consumers never see a published package pointing at
//! an unreleased dependency.
//!
//! # Features
//!
//! - **Commit Classification**: Conventional-commit headers become typed change records
//! - **Change Detection**: Commit scopes, touched paths, and manifest digests
//! - **Version Cascades**: Dependency bumps propagate through the workspace graph
//! - **Changelog Generation**: Per-package sections with dependency update bullets
//! - **Ordered Publishing**: Sequential, fail-fast, idempotent publishing with rollback
//!
//! # Architecture
//!
//! - [`commit`] - Commit classification
//! - [`detect`] - Changed package detection
//! - [`calculator`] - Primary version decisions
//! - [`graph`] - Dependency graph and topological order
//! - [`cascade`] - Cascade propagation
//! - [`changelog`] - Changelog rendering and writing
//! - [`plan`] - Release plans
//! - [`publish`] - Publisher and rollback
//! - [`pipeline`] - The stages wired together for one workspace
//!
//! # Example
//!
//! ```rust,ignore
//! use cascade_release::{PlanOutcome, ReleasePipeline};
//! use std::path::Path;
//!
//! let pipeline = ReleasePipeline::open(Path::new("."), None)?;
//! match pipeline.plan()? {
//!     PlanOutcome::Ready(plan) => println!("{}", serde_json::to_string_pretty(&plan)?),
//!     PlanOutcome::NothingToRelease => println!("Nothing to release"),
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]

pub mod calculator;
pub mod cascade;
pub mod changelog;
pub mod commit;
pub mod config;
pub mod detect;
pub mod error;
pub mod graph;
pub mod history;
pub mod manifest;
pub mod markers;
pub mod package;
pub mod pipeline;
pub mod plan;
pub mod publish;
pub mod registry;
pub mod verify;
pub mod version;

// Re-export main types
pub use calculator::VersionDecision;
pub use changelog::{ChangelogGenerator, ChangelogSection};
pub use commit::{ChangeKind, ChangeRecord, CommitClassifier};
pub use config::{CascadePolicy, ReleaseConfig};
pub use error::{Error, Result};
pub use graph::{CycleError, DependencyGraph};
pub use history::{CommitSource, RawCommit};
pub use manifest::{ManifestSource, WorkspaceManifest};
pub use package::{Package, PackageId};
pub use pipeline::ReleasePipeline;
pub use plan::{PlanBuilder, PlanError, PlanOutcome, ReleasePlan};
pub use publish::{DryRun, PublishReport, PublishState, Publisher, SkipReason};
pub use registry::{PublishOutcome, Registry, RegistryError};
pub use version::{BumpLevel, Version};
