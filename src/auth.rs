use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Stretch count for the salted digest. Single-round unsalted SHA-256 is
/// only accepted for rows written by pre-salt databases, and those are
/// re-hashed on the next successful login.
const STRETCH_ROUNDS: u32 = 10_000;

pub fn new_salt() -> String {
    Uuid::new_v4().simple().to_string()
}

pub fn hash_password(password: &str, salt: &str) -> String {
    let mut digest: [u8; 32] = {
        let mut h = Sha256::new();
        h.update(salt.as_bytes());
        h.update(password.as_bytes());
        h.finalize().into()
    };
    for _ in 1..STRETCH_ROUNDS {
        let mut h = Sha256::new();
        h.update(digest);
        digest = h.finalize().into();
    }
    hex::encode(digest)
}

/// Digest shape used before the salt column existed.
pub fn legacy_hash_password(password: &str) -> String {
    let mut h = Sha256::new();
    h.update(password.as_bytes());
    hex::encode(h.finalize())
}

/// An empty salt marks a legacy row.
pub fn verify_password(password: &str, salt: &str, stored_hash: &str) -> bool {
    if salt.is_empty() {
        legacy_hash_password(password) == stored_hash
    } else {
        hash_password(password, salt) == stored_hash
    }
}
