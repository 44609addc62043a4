use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use ulid::Ulid;

use crate::config::Config;
use crate::reservation::Role;

const ACCESS_TTL_MINUTES: i64 = 15;
const REFRESH_TTL_DAYS: i64 = 30;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("invalid login")]
    InvalidLogin,
    #[error("invalid token: {0}")]
    InvalidToken(String),
    #[error("token signing failed: {0}")]
    Signing(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Access,
    Refresh,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub exp: i64,
    pub iat: i64,
    pub jti: String,
    pub typ: TokenKind,
}

#[derive(Debug, Clone)]
pub struct TokenPair {
    pub access: String,
    pub refresh: String,
}

/// One signing/verification key pair.
#[derive(Clone)]
struct Keys {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl Keys {
    fn from_secret(secret: &str) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
        }
    }
}

/// Issues and checks admin tokens. Built once at startup, shared read-only.
#[derive(Clone)]
pub struct TokenIssuer {
    access: Keys,
    refresh: Keys,
    admin_name: String,
    admin_password: String,
}

impl TokenIssuer {
    pub fn new(access_secret: &str, refresh_secret: &str, admin_name: &str, admin_password: &str) -> Self {
        Self {
            access: Keys::from_secret(access_secret),
            refresh: Keys::from_secret(refresh_secret),
            admin_name: admin_name.to_string(),
            admin_password: admin_password.to_string(),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            &config.access_secret,
            &config.refresh_secret,
            &config.admin_name,
            &config.admin_password,
        )
    }

    /// Check the admin credentials and hand out a fresh token pair.
    pub fn login(&self, username: &str, password: &str) -> Result<TokenPair, AuthError> {
        if username != self.admin_name || password != self.admin_password {
            return Err(AuthError::InvalidLogin);
        }
        self.issue()
    }

    /// Rotate both tokens given a valid refresh token.
    pub fn refresh(&self, refresh_token: &str) -> Result<TokenPair, AuthError> {
        let claims = verify(&self.refresh, refresh_token, TokenKind::Refresh)?;
        tracing::debug!("refreshing tokens for refresh token {}", claims.jti);
        self.issue()
    }

    /// Map an `Authorization` header value to a role. Anything but a valid
    /// bearer access token is treated as public.
    pub fn role_for(&self, authorization: Option<&str>) -> Role {
        let Some(token) = authorization.and_then(|h| h.strip_prefix("Bearer ")) else {
            return Role::Public;
        };
        match verify(&self.access, token, TokenKind::Access) {
            Ok(_) => Role::Admin,
            Err(e) => {
                tracing::debug!("bearer token rejected: {e}");
                Role::Public
            }
        }
    }

    fn issue(&self) -> Result<TokenPair, AuthError> {
        Ok(TokenPair {
            access: sign(&self.access, TokenKind::Access, Duration::minutes(ACCESS_TTL_MINUTES))?,
            refresh: sign(&self.refresh, TokenKind::Refresh, Duration::days(REFRESH_TTL_DAYS))?,
        })
    }
}

fn sign(keys: &Keys, typ: TokenKind, ttl: Duration) -> Result<String, AuthError> {
    let now = Utc::now();
    let claims = Claims {
        exp: (now + ttl).timestamp(),
        iat: now.timestamp(),
        jti: Ulid::new().to_string(),
        typ,
    };
    encode(&Header::default(), &claims, &keys.encoding).map_err(|e| AuthError::Signing(e.to_string()))
}

fn verify(keys: &Keys, token: &str, expected: TokenKind) -> Result<Claims, AuthError> {
    let data = decode::<Claims>(token, &keys.decoding, &Validation::default())
        .map_err(|e| AuthError::InvalidToken(e.to_string()))?;
    if data.claims.typ != expected {
        return Err(AuthError::InvalidToken("wrong token type".into()));
    }
    Ok(data.claims)
}

/// Max-Age of the refresh cookie, matching the refresh token lifetime.
pub fn refresh_cookie_max_age() -> i64 {
    Duration::days(REFRESH_TTL_DAYS).num_seconds()
}
