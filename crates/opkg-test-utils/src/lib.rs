//! Shared test fixtures for the opkg workspace.
//!
//! Dev-dependency only, never published.
//!
//! # Modules
//!
//! - [`git`]: git-backed package repositories built with `git2`
//! - [`manifest`]: [`ManifestBuilder`] for `openpackage.yml` content
//! - [`workspace`]: [`TestWorkspace`] with a scratch workspace, registry and cache

pub mod git;
pub mod manifest;
pub mod workspace;

pub use manifest::ManifestBuilder;
pub use workspace::TestWorkspace;
