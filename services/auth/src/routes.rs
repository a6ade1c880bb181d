//! Authentication service routes

use axum::{
    Extension, Json, Router,
    extract::{ConnectInfo, Path, State},
    http::{HeaderMap, StatusCode},
    middleware,
    response::IntoResponse,
    routing::{delete, get, post},
};
use axum_extra::extract::cookie::CookieJar;
use serde::Deserialize;
use std::net::SocketAddr;
use tracing::info;
use uuid::Uuid;

use crate::{
    error::AuthResult,
    middleware::{AuthenticatedUser, auth_middleware, client_context, rate_limit_middleware},
    service::{AuthResponse, LoginRequest, RefreshResponse, RegisterRequest},
    state::AppState,
};

/// Request for a password change
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangePasswordRequest {
    pub current_password: String,
    pub new_password: String,
}

/// Create the router for the authentication service
pub fn create_router(state: AppState) -> Router {
    let protected = Router::new()
        .route("/auth/me", get(me))
        .route("/auth/sessions", get(list_sessions))
        .route("/auth/sessions/:id", delete(revoke_session))
        .route("/auth/logout-all", post(logout_all))
        .route("/auth/password", post(change_password))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    Router::new()
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
        // Logout lives under the refresh path, the only path the cookie is sent to.
        .route("/auth/refresh", post(refresh).delete(logout))
        .merge(protected)
        .layer(middleware::from_fn_with_state(
            state.clone(),
            rate_limit_middleware,
        ))
        .route("/health", get(health_check))
        .with_state(state)
}

/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "auth-service"
    }))
}

/// User registration endpoint
pub async fn register(
    State(state): State<AppState>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    jar: CookieJar,
    Json(payload): Json<RegisterRequest>,
) -> AuthResult<(StatusCode, CookieJar, Json<AuthResponse>)> {
    let client = client_context(&headers, connect_info.as_ref(), state.trust_proxy);
    let outcome = state.auth.register(payload, &client).await?;

    let jar = state.cookies.apply(jar, outcome.cookie);
    Ok((StatusCode::CREATED, jar, Json(outcome.body)))
}

/// User login endpoint
pub async fn login(
    State(state): State<AppState>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    jar: CookieJar,
    Json(payload): Json<LoginRequest>,
) -> AuthResult<(CookieJar, Json<AuthResponse>)> {
    let client = client_context(&headers, connect_info.as_ref(), state.trust_proxy);
    let outcome = state.auth.login(payload, &client).await?;

    let jar = state.cookies.apply(jar, outcome.cookie);
    Ok((jar, Json(outcome.body)))
}

/// Refresh token endpoint; the token travels in the refresh cookie
pub async fn refresh(
    State(state): State<AppState>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    jar: CookieJar,
) -> AuthResult<(CookieJar, Json<RefreshResponse>)> {
    let client = client_context(&headers, connect_info.as_ref(), state.trust_proxy);
    let token = state.cookies.read(&jar);
    let outcome = state.auth.refresh(token.as_deref(), &client).await?;

    let jar = state.cookies.apply(jar, outcome.cookie);
    Ok((jar, Json(outcome.body)))
}

/// Logout endpoint (`DELETE /auth/refresh`)
pub async fn logout(
    State(state): State<AppState>,
    jar: CookieJar,
) -> AuthResult<(StatusCode, CookieJar)> {
    let token = state.cookies.read(&jar);
    let jar = match state.auth.logout(token.as_deref()).await? {
        Some(directive) => state.cookies.apply(jar, directive),
        None => jar,
    };
    Ok((StatusCode::NO_CONTENT, jar))
}

/// Revoke every session of the caller
pub async fn logout_all(
    State(state): State<AppState>,
    Extension(AuthenticatedUser(user_id)): Extension<AuthenticatedUser>,
    jar: CookieJar,
) -> AuthResult<(StatusCode, CookieJar)> {
    let directive = state.auth.logout_all(user_id).await?;
    Ok((StatusCode::NO_CONTENT, state.cookies.apply(jar, directive)))
}

/// Current user endpoint
pub async fn me(
    State(state): State<AppState>,
    Extension(AuthenticatedUser(user_id)): Extension<AuthenticatedUser>,
) -> AuthResult<impl IntoResponse> {
    Ok(Json(state.auth.me(user_id).await?))
}

/// Active sessions of the caller
pub async fn list_sessions(
    State(state): State<AppState>,
    Extension(AuthenticatedUser(user_id)): Extension<AuthenticatedUser>,
) -> AuthResult<impl IntoResponse> {
    Ok(Json(state.auth.sessions(user_id).await?))
}

/// Revoke one session of the caller
pub async fn revoke_session(
    State(state): State<AppState>,
    Extension(AuthenticatedUser(user_id)): Extension<AuthenticatedUser>,
    Path(session_id): Path<Uuid>,
) -> AuthResult<StatusCode> {
    state.auth.revoke_session(user_id, session_id).await?;
    info!(user_id = %user_id, session_id = %session_id, "Session revoked");
    Ok(StatusCode::NO_CONTENT)
}

/// Password change endpoint
pub async fn change_password(
    State(state): State<AppState>,
    Extension(AuthenticatedUser(user_id)): Extension<AuthenticatedUser>,
    jar: CookieJar,
    Json(payload): Json<ChangePasswordRequest>,
) -> AuthResult<(StatusCode, CookieJar)> {
    let directive = state
        .auth
        .change_password(user_id, &payload.current_password, &payload.new_password)
        .await?;
    Ok((StatusCode::NO_CONTENT, state.cookies.apply(jar, directive)))
}
