//! Token issuer
//!
//! Access and refresh tokens are HS256 JWTs signed with two distinct
//! secrets, so a leaked refresh secret cannot mint access tokens and the
//! other way around. Both carry the user id, issue and expiry times, a
//! token type and a random `jti` that keeps every token value unique.

use jsonwebtoken::{
    Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode, errors::ErrorKind,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;
use uuid::Uuid;

use crate::config::TokenConfig;

/// Token verification or signing failure
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TokenError {
    /// Well-formed and correctly signed, but past its expiry
    #[error("Token expired")]
    Expired,

    /// Tampered, malformed, of the wrong type or signed with another key
    #[error("Invalid token signature")]
    InvalidSignature,

    #[error("Failed to sign token: {0}")]
    Signing(String),
}

/// Token type enum
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TokenType {
    Access,
    Refresh,
}

/// JWT claims structure
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    /// User ID
    pub sub: Uuid,
    /// Issued at time
    pub iat: u64,
    /// Expiration time
    pub exp: u64,
    /// Unique token id
    pub jti: Uuid,
    pub token_type: TokenType,
}

/// Identity carried by a verified token
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenSubject {
    pub user_id: Uuid,
}

struct KeyPair {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl_secs: u64,
}

impl KeyPair {
    fn from_secret(secret: &str, ttl_secs: u64) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            ttl_secs,
        }
    }
}

/// Stateless signer and verifier for access and refresh tokens
#[derive(Clone)]
pub struct TokenIssuer {
    inner: Arc<Inner>,
}

struct Inner {
    access: KeyPair,
    refresh: KeyPair,
    validation: Validation,
}

impl TokenIssuer {
    pub fn new(config: &TokenConfig) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;
        validation.leeway = 0;

        Self {
            inner: Arc::new(Inner {
                access: KeyPair::from_secret(&config.access_secret, config.access_ttl_secs),
                refresh: KeyPair::from_secret(&config.refresh_secret, config.refresh_ttl_secs),
                validation,
            }),
        }
    }

    pub fn sign_access(&self, user_id: Uuid) -> Result<String, TokenError> {
        self.sign_at(TokenType::Access, user_id, unix_now())
    }

    pub fn sign_refresh(&self, user_id: Uuid) -> Result<String, TokenError> {
        self.sign_at(TokenType::Refresh, user_id, unix_now())
    }

    pub fn verify_access(&self, token: &str) -> Result<TokenSubject, TokenError> {
        self.verify(TokenType::Access, token)
    }

    pub fn verify_refresh(&self, token: &str) -> Result<TokenSubject, TokenError> {
        self.verify(TokenType::Refresh, token)
    }

    /// Refresh token lifetime in seconds
    pub fn refresh_ttl_secs(&self) -> u64 {
        self.inner.refresh.ttl_secs
    }

    fn keys(&self, token_type: TokenType) -> &KeyPair {
        match token_type {
            TokenType::Access => &self.inner.access,
            TokenType::Refresh => &self.inner.refresh,
        }
    }

    /// Sign a token as if issued at `issued_at` (seconds since the epoch)
    pub(crate) fn sign_at(
        &self,
        token_type: TokenType,
        user_id: Uuid,
        issued_at: u64,
    ) -> Result<String, TokenError> {
        let keys = self.keys(token_type);
        let claims = Claims {
            sub: user_id,
            iat: issued_at,
            exp: issued_at
                .checked_add(keys.ttl_secs)
                .ok_or_else(|| TokenError::Signing("Token lifetime out of range".to_string()))?,
            jti: Uuid::new_v4(),
            token_type,
        };

        encode(&Header::new(Algorithm::HS256), &claims, &keys.encoding)
            .map_err(|e| TokenError::Signing(e.to_string()))
    }

    fn verify(&self, token_type: TokenType, token: &str) -> Result<TokenSubject, TokenError> {
        let keys = self.keys(token_type);
        let data = decode::<Claims>(token, &keys.decoding, &self.inner.validation).map_err(
            |e| match e.kind() {
                ErrorKind::ExpiredSignature => TokenError::Expired,
                _ => TokenError::InvalidSignature,
            },
        )?;

        if data.claims.token_type != token_type {
            return Err(TokenError::InvalidSignature);
        }

        Ok(TokenSubject {
            user_id: data.claims.sub,
        })
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}
