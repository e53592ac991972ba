//! Signed identity tokens
//!
//! Tokens are compact HS256 JWS strings carrying the subject id and email.
//! They are stateless: verification is a pure function of the token, the
//! clock, the signing secret and the user directory, so a shared
//! [`TokenService`] is safe to use from any number of tasks.

use std::sync::Arc;

use chrono::Utc;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::model::{Identity, UserId};
use crate::store::UserDirectory;

/// Built-in development secret used when none is configured. Weak on
/// purpose: anyone reading this source can forge tokens signed with it.
pub const FALLBACK_SECRET: &str = "fallback-secret-key";

/// Where the process-wide signing secret comes from.
#[derive(Debug, Clone)]
pub enum SigningSecret {
    /// Operator-supplied secret.
    Configured(String),
    /// The built-in default. Fine for development, unsafe in production.
    Fallback,
}

impl SigningSecret {
    /// Build from an optional configured value. Unset or empty falls back to
    /// the built-in default with a startup warning; it is not a hard failure.
    pub fn from_config(configured: Option<String>) -> Self {
        match configured {
            Some(secret) if !secret.is_empty() => Self::Configured(secret),
            _ => {
                tracing::warn!("No signing secret configured, using the built-in fallback secret");
                Self::Fallback
            }
        }
    }

    fn as_bytes(&self) -> &[u8] {
        match self {
            Self::Configured(secret) => secret.as_bytes(),
            Self::Fallback => FALLBACK_SECRET.as_bytes(),
        }
    }
}

/// Claims carried by an issued token
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    /// Subject user id
    pub sub: UserId,
    pub email: String,
    /// Issued-at, unix seconds
    pub iat: i64,
    /// Expiry, unix seconds
    pub exp: i64,
}

/// Issues and verifies signed, time-limited identity tokens.
pub struct TokenService {
    secret: SigningSecret,
    directory: Arc<dyn UserDirectory>,
}

impl TokenService {
    pub fn new(secret: SigningSecret, directory: Arc<dyn UserDirectory>) -> Self {
        Self { secret, directory }
    }

    /// Encode a signed token for `identity`, valid for `ttl` from now.
    pub fn issue(&self, identity: &Identity, ttl: chrono::Duration) -> Result<String> {
        let now = Utc::now();
        let claims = Claims {
            sub: identity.id,
            email: identity.email.clone(),
            iat: now.timestamp(),
            exp: (now + ttl).timestamp(),
        };
        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.secret.as_bytes()),
        )
        .map_err(|e| Error::Internal(format!("token encoding failed: {e}")))
    }

    /// Check signature and expiry, then resolve the subject through the
    /// directory.
    ///
    /// Returns `Ok(None)` when the token itself is sound but the subject no
    /// longer exists; whether that matters is the caller's decision.
    pub async fn verify(&self, token: &str) -> Result<Option<Identity>> {
        let claims = self.decode(token)?;
        Ok(self.directory.find_by_id(claims.sub).await)
    }

    /// Signature and expiry check without subject resolution.
    pub fn decode(&self, token: &str) -> Result<Claims> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.secret.as_bytes()),
            &validation,
        )
        .map(|data| data.claims)
        .map_err(|e| Error::InvalidToken(e.to_string()))
    }
}
