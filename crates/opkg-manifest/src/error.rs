use std::path::PathBuf;

/// Errors produced while reading manifests or the installed index.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Manifest file not found at the expected path.
    #[error("manifest not found: {0}")]
    NotFound(PathBuf),

    /// Manifest exists but is not valid YAML for the schema.
    #[error("failed to parse manifest {path}: {message}")]
    Parse { path: PathBuf, message: String },

    /// Package name does not follow the naming rules.
    #[error("invalid package name '{name}': {reason}")]
    InvalidName { name: String, reason: String },

    /// A manifest `version` field is not semver.
    #[error("invalid version '{version}': {source}")]
    InvalidVersion {
        version: String,
        source: semver::Error,
    },

    /// A dependency entry is self-contradictory or incomplete.
    #[error("invalid dependency '{name}': {reason}")]
    InvalidDependency { name: String, reason: String },

    #[error(transparent)]
    Fs(#[from] opkg_fs::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
