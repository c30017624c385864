//! SHA-256 digests used as stable identity keys.

use sha2::{Digest, Sha256};

/// First `len` hex digits of the SHA-256 digest of `content`.
///
/// `len` is clamped to the full digest length (64).
pub fn short_digest(content: &str, len: usize) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    let mut digest = format!("{:x}", hasher.finalize());
    digest.truncate(len.min(64));
    digest
}
