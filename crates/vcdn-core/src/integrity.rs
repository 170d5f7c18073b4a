//! Sub-resource-Integrity digests.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use sha2::{Digest, Sha384};
use vcdn_schema::FileEntry;

/// Prefix of every integrity string we emit.
pub const SRI_PREFIX: &str = "sha384-";

/// `sha384-<base64>` of `data`.
pub fn sri_sha384(data: &[u8]) -> String {
    let digest = Sha384::digest(data);
    format!("{SRI_PREFIX}{}", STANDARD.encode(digest))
}

/// Integrity string and length of `data`, as stored in manifests.
pub fn digest(data: &[u8]) -> FileEntry {
    FileEntry {
        integrity: sri_sha384(data),
        bytes: data.len() as u64,
    }
}

/// Check `data` against a manifest entry.
pub fn verify(data: &[u8], entry: &FileEntry) -> bool {
    entry.bytes == data.len() as u64 && sri_sha384(data) == entry.integrity
}
