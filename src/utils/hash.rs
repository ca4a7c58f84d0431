use sha2::{Digest, Sha256};

/// Compute SHA-256 hash of a string
pub fn compute_hash(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    hex::encode(hasher.finalize())
}

/// Hash a password salted with its username, so equal passwords on
/// different accounts do not share a digest
pub fn hash_password(username: &str, password: &str) -> String {
    compute_hash(&format!("{username}:{password}"))
}

pub fn verify_password(username: &str, password: &str, stored_hash: &str) -> bool {
    hash_password(username, password) == stored_hash
}
