//! JWT issuance and verification.
//!
//! Tokens are HS256-signed with the configured secret. The `jti` claim keys a
//! row in the session store; [`crate::services::UserService`] checks that row
//! so tokens can be revoked before they expire.

use crate::config::AuthConfig;
use crate::models::{now, UserRole};
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Claims carried in every access token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// User id.
    pub sub: String,
    /// Token id, also the session id.
    pub jti: String,
    pub role: String,
    pub iat: usize,
    /// Expiry (seconds since epoch).
    pub exp: usize,
}

#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    #[error("Failed to sign token: {0}")]
    Encode(#[source] jsonwebtoken::errors::Error),

    #[error("Invalid token: {0}")]
    Invalid(String),
}

/// A freshly signed token and the facts needed to persist its session.
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: String,
    pub jti: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    /// Lifetime in seconds, as returned to clients.
    pub expires_in: i64,
}

/// Signs and verifies access tokens.
pub struct TokenIssuer {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    ttl: Duration,
}

impl TokenIssuer {
    pub fn new(secret: &str, ttl: Duration) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            ttl,
        }
    }

    pub fn from_config(config: &AuthConfig) -> Self {
        Self::new(&config.jwt_secret, Duration::hours(config.token_ttl_hours))
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Sign a token for `user_id` with a new random `jti`.
    pub fn issue(&self, user_id: Uuid, role: UserRole) -> Result<IssuedToken, TokenError> {
        let issued_at = now();
        let expires_at = issued_at + self.ttl;
        let jti = Uuid::new_v4().to_string();

        let claims = Claims {
            sub: user_id.to_string(),
            jti: jti.clone(),
            role: role.to_string(),
            iat: issued_at.timestamp().max(0) as usize,
            exp: expires_at.timestamp().max(0) as usize,
        };

        let token =
            encode(&Header::default(), &claims, &self.encoding_key).map_err(TokenError::Encode)?;

        Ok(IssuedToken {
            token,
            jti,
            issued_at,
            expires_at,
            expires_in: self.ttl.num_seconds(),
        })
    }

    /// Check signature and expiry and return the claims.
    pub fn verify(&self, token: &str) -> Result<Claims, TokenError> {
        decode::<Claims>(token, &self.decoding_key, &Validation::default())
            .map(|data| data.claims)
            .map_err(|e| TokenError::Invalid(e.to_string()))
    }
}
