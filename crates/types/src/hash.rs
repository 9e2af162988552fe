use sha2::{Digest, Sha256};

/// Length of a hex-encoded SHA-256 digest
pub const SHA256_HEX_LEN: usize = 64;

/// Characters of a digest kept when it is shown in a message
pub const DISPLAY_DIGEST_LEN: usize = 16;

/// Compute the lowercase hex SHA-256 digest of `data`
pub fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Whether `value` looks like a hex SHA-256 digest
pub fn is_sha256_hex(value: &str) -> bool {
    value.len() == SHA256_HEX_LEN && value.bytes().all(|b| b.is_ascii_hexdigit())
}

/// Truncate a digest for display, e.g. `3a7bd3e2360a3d29...`
pub fn short_digest(digest: &str) -> String {
    match digest.get(..DISPLAY_DIGEST_LEN) {
        Some(prefix) if digest.len() > DISPLAY_DIGEST_LEN => format!("{prefix}..."),
        _ => digest.to_string(),
    }
}
