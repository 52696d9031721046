//! One-way password hashing for the credential store.

use crate::ryanella::error::ApiError;
use std::sync::LazyLock;

/// Cost factor for new digests. Matches the digests already seeded in the
/// credential store, so verification stays uniform across accounts.
pub const HASH_COST: u32 = 10;

// Digest used to burn comparable work when a login email matches no account.
static DUMMY_DIGEST: LazyLock<String> =
    LazyLock::new(|| bcrypt::hash("ryanella-dummy-credential", HASH_COST).unwrap_or_default());

/// Hash a plaintext password. Hashing failure is fatal and surfaces as an
/// internal error; the plaintext is never logged.
pub fn hash(plaintext: &str) -> Result<String, ApiError> {
    bcrypt::hash(plaintext, HASH_COST).map_err(ApiError::from)
}

/// Verify a plaintext password against a stored digest. A mismatch or an
/// unparseable digest is not an error, just `false`.
#[must_use]
pub fn verify(plaintext: &str, digest: &str) -> bool {
    bcrypt::verify(plaintext, digest).unwrap_or(false)
}

/// Run a verification against a fixed digest so login attempts for unknown
/// emails cost the same as attempts against real accounts.
pub fn dummy_verify(plaintext: &str) {
    let _ = bcrypt::verify(plaintext, &DUMMY_DIGEST);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_and_verify_round_trip() {
        let digest = hash("SuperSecure123!").unwrap();

        assert!(digest.starts_with("$2"));
        assert!(verify("SuperSecure123!", &digest));
        assert!(!verify("wrong-password", &digest));
    }

    #[test]
    fn verify_rejects_malformed_digest() {
        assert!(!verify("anything", "not-a-bcrypt-digest"));
        assert!(!verify("anything", ""));
    }

    #[test]
    fn dummy_verify_never_panics() {
        dummy_verify("probe-password");
    }
}
