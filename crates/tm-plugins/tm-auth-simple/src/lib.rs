//! # tm-auth-simple
//!
//! Argon2 password hashing plus HS256 JWT session tokens.
//!
//! Claims carry the user id in `sub` and the expiry in `exp`. Expiry is
//! checked against the caller's clock instead of the system clock, so the
//! service layer stays testable with a fixed `now`.

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use tm_core::traits::AuthProvider;
use tracing::debug;
use uuid::Uuid;

#[derive(Debug, Serialize, Deserialize)]
struct SessionClaims {
    sub: String,
    iat: i64,
    exp: i64,
}

pub struct SimpleAuthProvider {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
    session_ttl: Duration,
}

impl SimpleAuthProvider {
    /// `secret` keys the session signatures; rotating it logs everyone out.
    pub fn new(secret: &[u8], session_ttl: Duration) -> anyhow::Result<Self> {
        if secret.is_empty() {
            anyhow::bail!("session secret must not be empty");
        }

        let mut validation = Validation::new(Algorithm::HS256);
        // Expiry is compared with the injected `now` in `verify_session`.
        validation.validate_exp = false;
        validation.set_required_spec_claims(&["sub", "exp"]);

        Ok(Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            validation,
            session_ttl,
        })
    }
}

#[async_trait]
impl AuthProvider for SimpleAuthProvider {
    fn hash_password(&self, password: &str) -> anyhow::Result<String> {
        let salt = SaltString::generate(&mut OsRng);
        let hash = Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .map_err(|e| anyhow::anyhow!("hashing password: {e}"))?;
        Ok(hash.to_string())
    }

    /// Verifies if a provided password matches a stored Argon2 hash.
    async fn verify_password(&self, password: &str, hash: &str) -> bool {
        let parsed_hash = match PasswordHash::new(hash) {
            Ok(p) => p,
            Err(_) => return false,
        };
        Argon2::default()
            .verify_password(password.as_bytes(), &parsed_hash)
            .is_ok()
    }

    fn issue_session(&self, user_id: Uuid, now: DateTime<Utc>) -> anyhow::Result<String> {
        let claims = SessionClaims {
            sub: user_id.to_string(),
            iat: now.timestamp(),
            exp: (now + self.session_ttl).timestamp(),
        };
        jsonwebtoken::encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| anyhow::anyhow!("signing session token: {e}"))
    }

    fn verify_session(&self, token: &str, now: DateTime<Utc>) -> Option<Uuid> {
        let data = match jsonwebtoken::decode::<SessionClaims>(token, &self.decoding, &self.validation) {
            Ok(data) => data,
            Err(e) => {
                debug!(error = %e, "session token rejected");
                return None;
            }
        };
        if data.claims.exp <= now.timestamp() {
            debug!("session expired");
            return None;
        }
        data.claims.sub.parse().ok()
    }
}
