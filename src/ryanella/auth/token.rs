//! Stateless bearer tokens: HS256-signed claims carrying identity and role.
//!
//! Verification is purely cryptographic, no session store and no database
//! round-trip. Blocking or demoting an account therefore takes effect on the
//! next login, bounded by the configured TTL.

use crate::ryanella::models::{Role, User};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Claim set embedded in every bearer token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub email: String,
    pub role: Role,
    pub iat: i64,
    pub exp: i64,
}

/// Signing and verification keys derived from the server-held secret.
pub struct TokenKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl: Duration,
    validation: Validation,
}

impl TokenKeys {
    #[must_use]
    pub fn new(secret: &SecretString, ttl_hours: u64) -> Self {
        let secret = secret.expose_secret().as_bytes();

        let mut validation = Validation::default();
        // Expiry is exact, no grace window.
        validation.leeway = 0;

        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            ttl: Duration::hours(i64::try_from(ttl_hours).unwrap_or(24)),
            validation,
        }
    }

    /// Mint a token for an authenticated user. The role claim reflects the
    /// account at issuance time.
    ///
    /// # Errors
    ///
    /// Returns an error if claim serialization or signing fails.
    pub fn issue(&self, user: &User) -> Result<String, jsonwebtoken::errors::Error> {
        let now = Utc::now();

        let claims = Claims {
            sub: user.id,
            email: user.email.clone(),
            role: user.role,
            iat: now.timestamp(),
            exp: (now + self.ttl).timestamp(),
        };

        self.sign(&claims)
    }

    pub(crate) fn sign(&self, claims: &Claims) -> Result<String, jsonwebtoken::errors::Error> {
        encode(&Header::default(), claims, &self.encoding)
    }

    /// Check signature integrity and expiry, returning the decoded claims
    /// only if both hold.
    ///
    /// # Errors
    ///
    /// Returns an error for malformed tokens, bad signatures, and expired
    /// claims; callers treat every failure as unauthenticated.
    pub fn verify(&self, token: &str) -> Result<Claims, jsonwebtoken::errors::Error> {
        decode::<Claims>(token, &self.decoding, &self.validation).map(|data| data.claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::errors::ErrorKind;

    fn keys() -> TokenKeys {
        TokenKeys::new(&SecretString::from("test-signing-secret"), 24)
    }

    fn sample_user() -> User {
        User {
            id: Uuid::new_v4(),
            name: "Eris Annie".to_string(),
            email: "a@x.com".to_string(),
            password_hash: String::new(),
            role: Role::SuperAdmin,
            is_blocked: false,
        }
    }

    #[test]
    fn verify_returns_issued_claims() {
        let keys = keys();
        let user = sample_user();

        let token = keys.issue(&user).unwrap();
        let claims = keys.verify(&token).unwrap();

        assert_eq!(claims.sub, user.id);
        assert_eq!(claims.email, user.email);
        assert_eq!(claims.role, Role::SuperAdmin);
        assert_eq!(claims.exp, claims.iat + 24 * 3600);
    }

    #[test]
    fn expired_token_is_rejected() {
        let keys = keys();
        let now = Utc::now().timestamp();

        let claims = Claims {
            sub: Uuid::new_v4(),
            email: "a@x.com".to_string(),
            role: Role::Admin,
            iat: now - 7200,
            exp: now - 1,
        };
        let token = keys.sign(&claims).unwrap();

        let err = keys.verify(&token).unwrap_err();
        assert_eq!(err.kind(), &ErrorKind::ExpiredSignature);
    }

    #[test]
    fn tampered_token_is_rejected() {
        let keys = keys();
        let token = keys.issue(&sample_user()).unwrap();

        // Truncate the signature segment.
        let mut tampered = token.clone();
        tampered.remove(tampered.len() - 5);

        assert!(keys.verify(&tampered).is_err());
    }

    #[test]
    fn token_from_another_secret_is_rejected() {
        let token = keys().issue(&sample_user()).unwrap();

        let other = TokenKeys::new(&SecretString::from("different-secret"), 24);
        assert!(other.verify(&token).is_err());
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(keys().verify("not-a-token").is_err());
        assert!(keys().verify("").is_err());
    }
}
