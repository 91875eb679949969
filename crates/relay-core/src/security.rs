//! Constant-time credential comparison and stable key-id derivation.
//!
//! Per §3 ("key-id: stable opaque; first 8 hex of SHA-256 of secret") and
//! §4.9 ("Live auth... constant-time comparison over SHA-256 digests").

use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

/// Derive the stable, non-secret key-id for a pool credential: the first 8
/// hex characters of SHA-256(secret). Collisions are astronomically
/// unlikely for any realistic pool size and are not guarded against.
pub fn key_id_for_secret(secret: &str) -> String {
    let digest = Sha256::digest(secret.as_bytes());
    hex_prefix(&digest, 4)
}

fn hex_prefix(bytes: &[u8], n: usize) -> String {
    bytes[..n].iter().map(|b| format!("{b:02x}")).collect()
}

/// Compare two secrets for equality without leaking timing information
/// proportional to the length of the shared prefix. Both sides are hashed
/// first so the comparison itself operates on fixed-size digests
/// regardless of input length.
pub fn secure_compare(a: &str, b: &str) -> bool {
    let da = Sha256::digest(a.as_bytes());
    let db = Sha256::digest(b.as_bytes());
    da.ct_eq(&db).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_id_is_stable_and_short() {
        let id1 = key_id_for_secret("sk-ant-abc123");
        let id2 = key_id_for_secret("sk-ant-abc123");
        assert_eq!(id1, id2);
        assert_eq!(id1.len(), 8);
    }

    #[test]
    fn key_id_differs_for_different_secrets() {
        assert_ne!(key_id_for_secret("secret-a"), key_id_for_secret("secret-b"));
    }

    #[test]
    fn key_id_never_contains_the_secret() {
        let secret = "sk-ant-super-secret-value";
        assert!(!key_id_for_secret(secret).contains(secret));
    }

    #[test]
    fn secure_compare_equal_and_unequal() {
        assert!(secure_compare("same-value", "same-value"));
        assert!(!secure_compare("same-value", "different-value"));
        assert!(!secure_compare("short", "a-lot-longer-value"));
    }

    #[test]
    fn secure_compare_empty_strings() {
        assert!(secure_compare("", ""));
    }
}
