use std::path::PathBuf;

use crate::graph::NodeState;

/// Errors that can occur while resolving, planning or executing an install.
///
/// Branch-local failures (one dependency subtree) are normally converted
/// into graph warnings by the caller; only root-manifest failures, fatal
/// cycles and cancellation surface as `Err` from the pipeline.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A manifest entry is malformed.
    #[error("invalid dependency '{name}' declared in {manifest}: {reason}")]
    Declaration {
        name: String,
        manifest: PathBuf,
        reason: String,
    },

    /// A declaration names a source that cannot be interpreted.
    #[error("cannot resolve source for '{name}': {reason}")]
    SourceResolution { name: String, reason: String },

    /// Fetching or reading a resolved source failed.
    #[error("failed to load '{name}': {reason}")]
    Load { name: String, reason: String },

    /// The workspace's own manifest could not be read.
    #[error("root manifest {path} could not be read: {source}")]
    RootManifest {
        path: PathBuf,
        #[source]
        source: opkg_manifest::Error,
    },

    /// A cycle was found and the cycle policy treats cycles as fatal.
    #[error("dependency cycle detected: {}", members.join(" -> "))]
    Cycle { members: Vec<String> },

    /// A version range could not be parsed.
    #[error("invalid version constraint '{constraint}': {reason}")]
    VersionConstraint { constraint: String, reason: String },

    /// A node was asked to move to a state its lifecycle does not allow.
    #[error("invalid state transition for '{node}': {from} -> {to}")]
    InvalidTransition {
        node: String,
        from: NodeState,
        to: NodeState,
    },

    /// The external installer failed for one package.
    #[error("installation of '{name}' failed: {reason}")]
    Install { name: String, reason: String },

    /// The run was cancelled between installs.
    #[error("cancelled")]
    Cancelled,

    #[error(transparent)]
    Manifest(#[from] opkg_manifest::Error),

    #[error(transparent)]
    Fs(#[from] opkg_fs::Error),

    #[error(transparent)]
    Git(#[from] opkg_git::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
