//! SHA-256 helpers shared by the baseline store, detectors and pin sets.

use sha2::{Digest, Sha256};

/// SHA-256 of `data`, lowercase hex.
pub fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Normalize a digest string: strip an optional `sha256:` prefix,
/// lowercase, and require exactly 64 hex characters.
pub fn normalize_sha256(value: &str) -> Option<String> {
    let stripped = value.strip_prefix("sha256:").unwrap_or(value);
    let lower = stripped.to_ascii_lowercase();
    if lower.len() == 64 && lower.bytes().all(|b| b.is_ascii_hexdigit()) {
        Some(lower)
    } else {
        None
    }
}

/// Constant-time byte comparison.
///
/// Always compares all bytes regardless of where a mismatch occurs, so a
/// digest comparison does not leak the mismatch position through timing.
#[inline(never)]
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut result = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        result |= x ^ y;
    }
    result == 0
}
