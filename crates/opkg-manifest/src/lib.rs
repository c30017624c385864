//! Package manifest model for opkg.
//!
//! This crate owns the `openpackage.yml` schema, the [`ManifestReader`]
//! contract the resolver reads manifests through, and the workspace's
//! installed-package index.

pub mod error;
pub mod index;
pub mod manifest;
pub mod reader;

/// The canonical filename for package manifests.
pub const MANIFEST_FILENAME: &str = "openpackage.yml";

/// Directory (relative to the workspace root) holding opkg state.
pub const STATE_DIR: &str = ".openpackage";

pub use error::{Error, Result};
pub use index::{InstalledIndex, InstalledPackage};
pub use manifest::{DependencyEntry, PackageManifest, validate_package_name};
pub use reader::{ManifestReader, YamlManifestReader};
