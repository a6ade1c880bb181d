//! Application state shared across handlers

use crate::{cookie::RefreshCookie, rate_limiter::RateLimiter, service::AuthService};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub auth: AuthService,
    pub rate_limiter: RateLimiter,
    pub cookies: RefreshCookie,
    /// Client addresses come from `X-Forwarded-For`
    pub trust_proxy: bool,
}
