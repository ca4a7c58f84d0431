mod hash;

pub use hash::{compute_hash, hash_password, verify_password};

/// Get current timestamp in ISO 8601 format
pub fn now_iso() -> String {
    chrono::Utc::now().to_rfc3339()
}
