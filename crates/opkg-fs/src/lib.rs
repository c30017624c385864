//! Filesystem primitives for opkg
//!
//! Provides normalized path handling, atomic I/O, identity digests and a
//! format-agnostic config store shared by the manifest and resolver crates.

pub mod checksum;
pub mod config;
pub mod error;
pub mod io;
pub mod path;

pub use config::ConfigStore;
pub use error::{Error, Result};
pub use path::{NormalizedPath, canonicalize_lenient};
