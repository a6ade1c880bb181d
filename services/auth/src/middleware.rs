//! Middleware for bearer authentication and rate limiting

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{HeaderMap, HeaderValue, Request, header},
    middleware::Next,
    response::Response,
};
use std::net::SocketAddr;
use tracing::debug;
use uuid::Uuid;

use crate::{
    error::AuthError,
    rate_limiter::{RateLimitStatus, RateScope},
    service::ClientContext,
    state::AppState,
};

/// User id proven by a valid access token
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthenticatedUser(pub Uuid);

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

/// Client address: the socket peer, or the first `X-Forwarded-For` hop when
/// `trust_proxy` is set
pub fn client_ip(
    headers: &HeaderMap,
    connect_info: Option<&ConnectInfo<SocketAddr>>,
    trust_proxy: bool,
) -> String {
    let forwarded = trust_proxy
        .then(|| headers.get("x-forwarded-for"))
        .flatten()
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(|ip| ip.trim().to_string())
        .filter(|ip| !ip.is_empty());

    forwarded
        .or_else(|| connect_info.map(|ConnectInfo(addr)| addr.ip().to_string()))
        .unwrap_or_else(|| "unknown".to_string())
}

/// Origin of a request as recorded on sessions
pub fn client_context(
    headers: &HeaderMap,
    connect_info: Option<&ConnectInfo<SocketAddr>>,
    trust_proxy: bool,
) -> ClientContext {
    ClientContext {
        ip_address: client_ip(headers, connect_info, trust_proxy),
        device: headers
            .get(header::USER_AGENT)
            .and_then(|value| value.to_str().ok())
            .map(|agent| agent.chars().take(255).collect()),
    }
}

/// Require a valid access token and expose its user id to handlers
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut req: Request<Body>,
    next: Next,
) -> Result<Response, AuthError> {
    let token = bearer_token(req.headers()).ok_or(AuthError::Unauthenticated)?;

    let subject = state.auth.tokens().verify_access(token).map_err(|e| {
        debug!("Access token rejected: {}", e);
        AuthError::Unauthenticated
    })?;

    req.extensions_mut().insert(AuthenticatedUser(subject.user_id));
    Ok(next.run(req).await)
}

/// Charge the request to its IP and, when it carries a valid access token,
/// to its user as well
///
/// Either budget running out rejects the request. Headers report the user
/// budget for authenticated callers and the IP budget otherwise.
pub async fn rate_limit_middleware(
    State(state): State<AppState>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    req: Request<Body>,
    next: Next,
) -> Result<Response, AuthError> {
    let ip = client_ip(req.headers(), connect_info.as_ref(), state.trust_proxy);
    let ip_status = state.rate_limiter.check(RateScope::Ip, &ip).await?;

    let user = bearer_token(req.headers())
        .and_then(|token| state.auth.tokens().verify_access(token).ok());
    let user_status = match user {
        Some(subject) => {
            state
                .rate_limiter
                .check(RateScope::User, &subject.user_id.to_string())
                .await?
        }
        None => None,
    };
    let status = user_status.or(ip_status);

    let mut response = next.run(req).await;
    if let Some(status) = status {
        insert_rate_limit_headers(response.headers_mut(), status);
    }
    Ok(response)
}

fn insert_rate_limit_headers(headers: &mut HeaderMap, status: RateLimitStatus) {
    headers.insert("x-ratelimit-limit", HeaderValue::from(status.limit));
    headers.insert("x-ratelimit-remaining", HeaderValue::from(status.remaining));
    headers.insert("x-ratelimit-reset", HeaderValue::from(status.reset_after_secs));
}
