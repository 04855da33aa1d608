//! Content hashing for change detection.
//!
//! Every artifact is identified by the SHA-256 of its final bytes, rendered as
//! lowercase hex. The same function hashes local artifacts and remote object
//! bodies, so two hashes are comparable exactly when they come from identical
//! bytes.
//!
//! Artifacts are always fully buffered before hashing. Callers hash a borrowed
//! slice and then write or upload the same buffer, so hashing never consumes
//! the content it describes.

use sha2::{Digest, Sha256};

/// SHA-256 of a byte slice, returned as a hex string.
pub fn hash_bytes(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    format!("{:x}", digest)
}
