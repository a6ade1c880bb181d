//! Authentication service
//!
//! Credential and session lifecycle for the HTTP API: password hashing,
//! access/refresh token issuance, refresh-token rotation backed by durable
//! sessions, and fixed-window rate limiting in front of every route.

pub mod config;
pub mod cookie;
pub mod database;
pub mod error;
pub mod hasher;
pub mod jwt;
pub mod middleware;
pub mod models;
pub mod rate_limiter;
pub mod repositories;
pub mod routes;
pub mod service;
pub mod state;
pub mod validation;

pub use config::AuthConfig;
pub use error::{AuthError, AuthResult};
pub use service::AuthService;
pub use state::AppState;
