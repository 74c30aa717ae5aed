//! cascade - command-line release orchestrator
//!
//! Thin front end over [`cascade_release`]:
//!
//! - `cascade plan` - compute the release plan (read-only)
//! - `cascade apply` - write versions, changelogs and release markers
//! - `cascade execute` - verify and publish a saved plan
//! - `cascade rollback` - yank one package of a previous run
//!
//! Exit codes: 0 success, 1 a package failed to publish, 2 nothing to
//! release, 3 configuration or fatal error.

/// CLI argument parsing, exit codes and output envelopes.
pub mod cli;
/// Command implementations.
pub mod commands;
/// Tracing setup.
pub mod tracing;
