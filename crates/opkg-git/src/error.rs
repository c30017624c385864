//! Error types for opkg-git

use std::path::PathBuf;

/// Result type for opkg-git operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in opkg-git operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Git error: {0}")]
    Git(#[from] git2::Error),

    #[error("Filesystem error: {0}")]
    Fs(#[from] opkg_fs::Error),

    #[error("Ref '{reference}' not found in {url}")]
    RefNotFound { url: String, reference: String },

    #[error("Subpath '{subpath}' does not exist in checkout at {checkout}")]
    SubpathNotFound { subpath: String, checkout: PathBuf },

    #[error("Invalid git URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },
}

impl Error {
    /// Network-class failures are worth retrying; everything else is not.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Git(e) => matches!(
                e.class(),
                git2::ErrorClass::Net | git2::ErrorClass::Http | git2::ErrorClass::Ssh
            ),
            _ => false,
        }
    }
}
