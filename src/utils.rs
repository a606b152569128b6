use sha2::{Digest, Sha256};

/// Hashed identifier for logs so user ids never appear in plaintext.
pub fn log_safe_id(id: &str, salt: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(id.as_bytes());
    let digest = hasher.finalize();
    // First 8 bytes are enough to correlate log lines.
    digest[..8].iter().map(|b| format!("{:02x}", b)).collect()
}
