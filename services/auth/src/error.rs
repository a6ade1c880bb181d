//! Error taxonomy of the authentication core and its HTTP mapping

use axum::{
    Json,
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde_json::json;
use std::fmt;
use thiserror::Error;
use tracing::error;

use crate::{hasher::HashError, jwt::TokenError, repositories::StoreError};

/// Unique attribute of a user that a registration collided with
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictField {
    Email,
    Username,
}

impl fmt::Display for ConflictField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConflictField::Email => f.write_str("email"),
            ConflictField::Username => f.write_str("username"),
        }
    }
}

/// Errors returned by the authentication operations
#[derive(Error, Debug)]
pub enum AuthError {
    /// Malformed input
    #[error("Validation failed: {0}")]
    Validation(String),

    /// Email or username already taken
    #[error("{0} already in use")]
    Conflict(ConflictField),

    /// Unknown identifier or wrong password; deliberately not told apart
    #[error("Invalid credentials")]
    InvalidCredentials,

    /// Missing, expired or forged access token
    #[error("Authentication required")]
    Unauthenticated,

    /// Account exists but is not `ACTIVE`
    #[error("Account is not active")]
    AccountInactive,

    /// No refresh token was presented
    #[error("Refresh token missing")]
    MissingToken,

    /// Refresh token unknown, expired, revoked or badly signed
    #[error("Invalid refresh token")]
    InvalidToken,

    /// A live session points at a user that no longer exists
    #[error("User not found")]
    UserNotFound,

    /// Request budget for the current window is exhausted
    #[error("Rate limit exceeded, retry after {retry_after} seconds")]
    RateLimited { retry_after: u64 },

    /// Durable store or cache unreachable
    #[error("Dependency unavailable: {0}")]
    DependencyUnavailable(String),

    /// Hashing or signing failed
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<StoreError> for AuthError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::UniqueViolation(field) => AuthError::Conflict(field),
            StoreError::NotFound => AuthError::Internal("record not found".to_string()),
            StoreError::Unavailable(msg) => AuthError::DependencyUnavailable(msg),
        }
    }
}

impl From<HashError> for AuthError {
    fn from(err: HashError) -> Self {
        AuthError::Internal(err.to_string())
    }
}

impl From<TokenError> for AuthError {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::Expired | TokenError::InvalidSignature => AuthError::InvalidToken,
            TokenError::Signing(msg) => AuthError::Internal(msg),
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = match &self {
            AuthError::Validation(_) => StatusCode::BAD_REQUEST,
            AuthError::Conflict(_) => StatusCode::CONFLICT,
            AuthError::InvalidCredentials
            | AuthError::Unauthenticated
            | AuthError::MissingToken
            | AuthError::InvalidToken => StatusCode::UNAUTHORIZED,
            AuthError::AccountInactive => StatusCode::FORBIDDEN,
            AuthError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            AuthError::DependencyUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            AuthError::UserNotFound | AuthError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        // Server-side detail stays in the logs.
        let message = match &self {
            AuthError::DependencyUnavailable(detail) | AuthError::Internal(detail) => {
                error!("Request failed: {}", detail);
                status
                    .canonical_reason()
                    .unwrap_or("Internal server error")
                    .to_string()
            }
            AuthError::UserNotFound => {
                error!("Session references a missing user");
                "Internal server error".to_string()
            }
            other => other.to_string(),
        };

        let mut body = json!({ "error": message });
        if let AuthError::Conflict(field) = &self {
            body["field"] = json!(field.to_string());
        }

        let mut response = (status, Json(body)).into_response();
        if let AuthError::RateLimited { retry_after } = self {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(retry_after));
        }
        response
    }
}

/// Type alias for authentication results
pub type AuthResult<T> = Result<T, AuthError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_limited_sets_retry_after() {
        let response = AuthError::RateLimited { retry_after: 42 }.into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers()[header::RETRY_AFTER], "42");
    }

    #[test]
    fn credential_failures_share_one_status() {
        assert_eq!(
            AuthError::InvalidCredentials.into_response().status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            AuthError::AccountInactive.into_response().status(),
            StatusCode::FORBIDDEN
        );
    }

    #[test]
    fn store_unique_violation_maps_to_conflict() {
        let err: AuthError = StoreError::UniqueViolation(ConflictField::Username).into();
        assert!(matches!(err, AuthError::Conflict(ConflictField::Username)));
        assert_eq!(err.to_string(), "username already in use");
    }

    #[test]
    fn expired_and_forged_tokens_collapse_to_invalid_token() {
        assert!(matches!(
            AuthError::from(TokenError::Expired),
            AuthError::InvalidToken
        ));
        assert!(matches!(
            AuthError::from(TokenError::InvalidSignature),
            AuthError::InvalidToken
        ));
    }
}
