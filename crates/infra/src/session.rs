//! Session service adapter: bearer token in, user id out.
//!
//! Session issuance and password checks live outside this workspace; the core
//! only needs "who is asking".

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use thiserror::Error;

use atelier_auth::{SessionClaims, validate_claims};
use atelier_core::UserId;

pub trait SessionService: Send + Sync {
    /// `None` for any token that does not prove an identity.
    fn authenticate(&self, token: &str, now: DateTime<Utc>) -> Option<UserId>;
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("failed to sign session token: {0}")]
    Signing(String),
}

/// HS256 JWT sessions with `{sub, iat, exp}` claims.
pub struct JwtSessionService {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
}

impl JwtSessionService {
    pub fn new(secret: &[u8]) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        // The time window is checked against the injected clock by `validate_claims`.
        validation.validate_exp = false;
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            validation,
        }
    }

    /// Mint a session token (dev tooling and tests).
    pub fn issue(&self, user_id: UserId, now: DateTime<Utc>, ttl: Duration) -> Result<String, SessionError> {
        let claims = SessionClaims::new(user_id, now, now + ttl);
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| SessionError::Signing(e.to_string()))
    }
}

impl SessionService for JwtSessionService {
    fn authenticate(&self, token: &str, now: DateTime<Utc>) -> Option<UserId> {
        let data = match decode::<SessionClaims>(token, &self.decoding, &self.validation) {
            Ok(data) => data,
            Err(err) => {
                tracing::debug!(error = %err, "session token rejected");
                return None;
            }
        };
        if let Err(err) = validate_claims(&data.claims, now) {
            tracing::debug!(error = %err, "session token outside its validity window");
            return None;
        }
        Some(data.claims.sub)
    }
}
