//! The manifest-reading contract consumed by the resolver.

use std::path::Path;

use opkg_fs::{NormalizedPath, io};

use crate::error::{Error, Result};
use crate::manifest::PackageManifest;

/// Reads and parses a manifest file.
///
/// Implementations must be safe to share across concurrent loader tasks.
pub trait ManifestReader: Send + Sync {
    /// Parse the manifest at `path`.
    ///
    /// # Errors
    ///
    /// [`Error::NotFound`] if the file does not exist, [`Error::Parse`] or a
    /// validation error if it cannot be understood.
    fn read(&self, path: &Path) -> Result<PackageManifest>;
}

/// Reads `openpackage.yml` files from disk.
#[derive(Debug, Default, Clone, Copy)]
pub struct YamlManifestReader;

impl ManifestReader for YamlManifestReader {
    fn read(&self, path: &Path) -> Result<PackageManifest> {
        let content = match io::read_text(&NormalizedPath::new(path)) {
            Ok(content) => content,
            Err(e) if e.is_not_found() => return Err(Error::NotFound(path.to_path_buf())),
            Err(e) => return Err(e.into()),
        };

        let manifest = PackageManifest::from_yaml(&content).map_err(|e| Error::Parse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        manifest.validate()?;

        tracing::trace!(path = %path.display(), name = %manifest.name, "Read manifest");
        Ok(manifest)
    }
}
