//! Access tokens issued at login.
//!
//! HS256 JWTs carrying the user id and role. Expiry is checked against
//! [`shutter_core::now`] rather than by the JWT library.

use std::time::Duration;

use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use shutter_core::{now, AuthError, AuthSettings, EntityId, JwtSecret, ShutterResult, User, UserRole};
use tracing::warn;

/// Claims carried by an access token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Subject: the user id as a string.
    pub sub: String,
    pub user_id: EntityId,
    pub role: UserRole,
    /// Issued at (Unix seconds)
    pub iat: i64,
    /// Expiration (Unix seconds)
    pub exp: i64,
}

impl Claims {
    pub fn for_user(user: &User, ttl: Duration) -> Self {
        let iat = now().timestamp();
        let ttl_secs = i64::try_from(ttl.as_secs()).unwrap_or(i64::MAX);
        Self {
            sub: user.id.to_string(),
            user_id: user.id,
            role: user.role,
            iat,
            exp: iat.saturating_add(ttl_secs),
        }
    }

    pub fn is_expired_at(&self, unix_secs: i64) -> bool {
        self.exp < unix_secs
    }
}

/// Issues the token handed back by a successful login.
pub trait TokenIssuer: Send + Sync {
    /// # Errors
    ///
    /// `AuthError::Token` if the token cannot be produced.
    fn issue(&self, user: &User) -> ShutterResult<String>;
}

fn token_error(reason: impl Into<String>) -> AuthError {
    AuthError::Token {
        reason: reason.into(),
    }
}

/// HS256 issuer and validator.
#[derive(Debug, Clone)]
pub struct JwtIssuer {
    secret: JwtSecret,
    ttl: Duration,
}

impl JwtIssuer {
    pub fn new(secret: JwtSecret, ttl: Duration) -> Self {
        Self { secret, ttl }
    }

    pub fn from_settings(settings: &AuthSettings) -> Self {
        if settings.jwt_secret.is_insecure_default() {
            warn!("SHUTTER_JWT_SECRET is not set, signing tokens with the insecure default");
        }
        Self::new(settings.jwt_secret.clone(), settings.token_ttl)
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Check signature and expiry, returning the claims.
    ///
    /// # Errors
    ///
    /// `AuthError::Token` for a malformed, forged or expired token.
    pub fn validate(&self, token: &str) -> ShutterResult<Claims> {
        let key = DecodingKey::from_secret(self.secret.expose().as_bytes());
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;
        validation.validate_nbf = false;
        validation.required_spec_claims = std::collections::HashSet::from(["exp".to_string()]);

        let claims = decode::<Claims>(token, &key, &validation)
            .map_err(|e| token_error(format!("token rejected: {e}")))?
            .claims;
        if claims.is_expired_at(now().timestamp()) {
            return Err(token_error("token expired").into());
        }
        Ok(claims)
    }
}

impl TokenIssuer for JwtIssuer {
    fn issue(&self, user: &User) -> ShutterResult<String> {
        let claims = Claims::for_user(user, self.ttl);
        let key = EncodingKey::from_secret(self.secret.expose().as_bytes());
        encode(&Header::new(Algorithm::HS256), &claims, &key)
            .map_err(|e| token_error(format!("failed to sign token: {e}")).into())
    }
}
