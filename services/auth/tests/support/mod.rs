#![allow(dead_code)]

use auth::{
    AppState, AuthConfig, AuthService,
    config::HashingConfig,
    cookie::{CookieDirective, RefreshCookie},
    hasher::Argon2Hasher,
    jwt::TokenIssuer,
    rate_limiter::{MemoryCounterStore, RateLimiter},
    repositories::{MemorySessionRepository, MemoryUserRepository},
    routes,
    service::{ClientContext, RegisterRequest},
};
use axum::Router;
use std::sync::Arc;

pub struct Harness {
    pub service: AuthService,
    pub users: MemoryUserRepository,
    pub sessions: MemorySessionRepository,
}

pub fn test_config() -> AuthConfig {
    let mut config = AuthConfig::with_secrets("test-access-secret", "test-refresh-secret");
    config.hashing = HashingConfig {
        memory_kib: 1024,
        iterations: 1,
        parallelism: 1,
    };
    config
}

pub fn harness(config: &AuthConfig) -> Harness {
    let users = MemoryUserRepository::new();
    let sessions = MemorySessionRepository::new();
    let service = AuthService::new(
        config,
        Arc::new(users.clone()),
        Arc::new(sessions.clone()),
        Arc::new(Argon2Hasher::new(&config.hashing).unwrap()),
        TokenIssuer::new(&config.tokens),
    );

    Harness {
        service,
        users,
        sessions,
    }
}

pub fn app(config: &AuthConfig) -> (Router, Harness) {
    let harness = harness(config);
    let state = AppState {
        auth: harness.service.clone(),
        rate_limiter: RateLimiter::new(Arc::new(MemoryCounterStore::new()), &config.rate_limit),
        cookies: RefreshCookie::new(&config.cookie),
        trust_proxy: config.trust_proxy,
    };
    (routes::create_router(state), harness)
}

pub fn client() -> ClientContext {
    ClientContext {
        ip_address: "198.51.100.4".to_string(),
        device: Some("integration-test".to_string()),
    }
}

pub fn alice() -> RegisterRequest {
    RegisterRequest {
        username: "alice01".to_string(),
        email: "a@x.com".to_string(),
        password: "Str0ng!Pass".to_string(),
    }
}

/// Refresh token carried by a `Set` directive
pub fn refresh_token_of(directive: &CookieDirective) -> String {
    match directive {
        CookieDirective::Set { value, .. } => value.clone(),
        CookieDirective::Clear => panic!("expected the refresh cookie to be set"),
    }
}
