//! Authentication orchestrator
//!
//! Composes the credential hasher, token issuer and repositories into the
//! register, login, refresh and logout flows.
//!
//! Every issued refresh token is backed by exactly one session row. Refresh
//! rotates: the presented session is revoked before a new pair is issued,
//! and only the caller whose revoke actually flipped the row may continue.
//! A crash between the two steps leaves the client logged out, never with
//! two live refresh tokens.

use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    config::AuthConfig,
    cookie::CookieDirective,
    error::{AuthError, AuthResult, ConflictField},
    hasher::CredentialHasher,
    jwt::TokenIssuer,
    models::{AccountStatus, NewSession, NewUser, Role, SessionView, User, UserView},
    repositories::{SessionRepository, StoreError, UserRepository},
    validation,
};

/// Registration payload
#[derive(Debug, Clone, Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    pub password: String,
}

/// Login payload; `identifier` is an email or a username
#[derive(Debug, Clone, Deserialize)]
pub struct LoginRequest {
    pub identifier: String,
    pub password: String,
}

/// Where a request came from, recorded on the session it creates
#[derive(Debug, Clone, Default)]
pub struct ClientContext {
    pub ip_address: String,
    pub device: Option<String>,
}

/// Body returned by register and login
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthResponse {
    pub user: UserView,
    pub access_token: String,
}

/// Body returned by refresh
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshResponse {
    pub access_token: String,
}

/// Result of an operation plus the cookie change it requires
#[derive(Debug, Clone)]
pub struct Outcome<T> {
    pub body: T,
    pub cookie: CookieDirective,
}

/// How a login identifier matched a user
#[derive(Debug, Clone)]
pub enum IdentifierMatch {
    Email(User),
    Username(User),
}

impl IdentifierMatch {
    pub fn into_user(self) -> User {
        match self {
            IdentifierMatch::Email(user) | IdentifierMatch::Username(user) => user,
        }
    }
}

/// Authentication service
#[derive(Clone)]
pub struct AuthService {
    users: Arc<dyn UserRepository>,
    sessions: Arc<dyn SessionRepository>,
    hasher: Arc<dyn CredentialHasher>,
    tokens: TokenIssuer,
    initial_status: AccountStatus,
    // Compared against when the identifier matches nobody, so unknown
    // accounts cost as much as wrong passwords.
    dummy_digest: Arc<OnceCell<String>>,
}

impl AuthService {
    pub fn new(
        config: &AuthConfig,
        users: Arc<dyn UserRepository>,
        sessions: Arc<dyn SessionRepository>,
        hasher: Arc<dyn CredentialHasher>,
        tokens: TokenIssuer,
    ) -> Self {
        let initial_status = if config.require_activation {
            AccountStatus::Pending
        } else {
            AccountStatus::Active
        };

        Self {
            users,
            sessions,
            hasher,
            tokens,
            initial_status,
            dummy_digest: Arc::new(OnceCell::new()),
        }
    }

    pub fn tokens(&self) -> &TokenIssuer {
        &self.tokens
    }

    /// Create an account and sign it in
    pub async fn register(
        &self,
        request: RegisterRequest,
        client: &ClientContext,
    ) -> AuthResult<Outcome<AuthResponse>> {
        let username = validation::normalize(&request.username);
        let email = validation::normalize(&request.email);
        validation::validate_username(&username).map_err(AuthError::Validation)?;
        validation::validate_email(&email).map_err(AuthError::Validation)?;
        validation::validate_password(&request.password).map_err(AuthError::Validation)?;

        if self.users.find_by_email(&email).await?.is_some() {
            return Err(AuthError::Conflict(ConflictField::Email));
        }
        if self.users.find_by_username(&username).await?.is_some() {
            return Err(AuthError::Conflict(ConflictField::Username));
        }

        let password_hash = self.hasher.hash(&request.password).await?;

        // A concurrent registration may win between the checks above and
        // this insert; the unique constraint reports it as the same conflict.
        let user = self
            .users
            .create(NewUser {
                username,
                email,
                password_hash,
                role: Role::User,
                status: self.initial_status,
            })
            .await?;

        info!(user_id = %user.id, status = %user.status, "User registered");
        self.start_session(user, client).await
    }

    /// Sign in with an email or username and a password
    pub async fn login(
        &self,
        request: LoginRequest,
        client: &ClientContext,
    ) -> AuthResult<Outcome<AuthResponse>> {
        let identifier = validation::normalize(&request.identifier);
        validation::validate_identifier(&identifier).map_err(AuthError::Validation)?;
        if request.password.is_empty() {
            return Err(AuthError::Validation("Password required".to_string()));
        }

        let user = match self.resolve_identifier(&identifier).await? {
            Some(found) => found.into_user(),
            None => {
                self.burn_comparison(&request.password).await;
                warn!("Login failed: unknown identifier");
                return Err(AuthError::InvalidCredentials);
            }
        };

        if !self
            .hasher
            .compare(&request.password, &user.password_hash)
            .await
        {
            warn!(user_id = %user.id, "Login failed: wrong password");
            return Err(AuthError::InvalidCredentials);
        }

        if !user.status.is_active() {
            warn!(user_id = %user.id, status = %user.status, "Login refused for inactive account");
            return Err(AuthError::AccountInactive);
        }

        info!(user_id = %user.id, "User logged in");
        self.start_session(user, client).await
    }

    /// Exchange a refresh token for a new access/refresh pair
    pub async fn refresh(
        &self,
        refresh_token: Option<&str>,
        client: &ClientContext,
    ) -> AuthResult<Outcome<RefreshResponse>> {
        let token = refresh_token
            .filter(|t| !t.is_empty())
            .ok_or(AuthError::MissingToken)?;

        let subject = self.tokens.verify_refresh(token).map_err(|e| {
            warn!("Refresh rejected: {}", e);
            AuthError::InvalidToken
        })?;

        let session = self
            .sessions
            .find_by_token(token)
            .await?
            .ok_or(AuthError::InvalidToken)?;

        if !session.is_active_at(Utc::now()) || session.user_id != subject.user_id {
            warn!(session_id = %session.id, "Refresh rejected: session revoked or expired");
            return Err(AuthError::InvalidToken);
        }

        let user = self
            .users
            .find_by_id(session.user_id)
            .await?
            .ok_or(AuthError::UserNotFound)?;

        // Only one caller can flip the row; a concurrent refresh with the
        // same token loses here.
        if self.sessions.revoke_by_token(token).await? == 0 {
            warn!(session_id = %session.id, "Refresh rejected: token already rotated");
            return Err(AuthError::InvalidToken);
        }

        if !user.status.is_active() {
            warn!(user_id = %user.id, "Refresh refused for inactive account");
            return Err(AuthError::AccountInactive);
        }

        let (access_token, cookie) = self.issue_pair(user.id, client).await?;
        info!(user_id = %user.id, "Refresh token rotated");

        Ok(Outcome {
            body: RefreshResponse { access_token },
            cookie,
        })
    }

    /// Revoke the presented refresh token
    ///
    /// Absent tokens and already revoked tokens are not errors. Returns the
    /// cookie change to apply, if any.
    pub async fn logout(&self, refresh_token: Option<&str>) -> AuthResult<Option<CookieDirective>> {
        let Some(token) = refresh_token.filter(|t| !t.is_empty()) else {
            return Ok(None);
        };

        let revoked = self.sessions.revoke_by_token(token).await?;
        info!(revoked, "User logged out");
        Ok(Some(CookieDirective::Clear))
    }

    /// Revoke every session of a user
    pub async fn logout_all(&self, user_id: Uuid) -> AuthResult<CookieDirective> {
        let revoked = self.sessions.revoke_all_for_user(user_id).await?;
        info!(user_id = %user_id, revoked, "All sessions revoked");
        Ok(CookieDirective::Clear)
    }

    /// Sessions the user can still refresh with
    pub async fn sessions(&self, user_id: Uuid) -> AuthResult<Vec<SessionView>> {
        let sessions = self
            .sessions
            .list_active_for_user(user_id, Utc::now())
            .await?;
        Ok(sessions.iter().map(|s| s.view()).collect())
    }

    /// Revoke one session of a user by id
    ///
    /// A session owned by somebody else is reported as missing.
    pub async fn revoke_session(&self, user_id: Uuid, session_id: Uuid) -> AuthResult<()> {
        let owned = self
            .sessions
            .list_active_for_user(user_id, Utc::now())
            .await?
            .iter()
            .any(|s| s.id == session_id);
        if !owned {
            return Err(AuthError::InvalidToken);
        }

        self.sessions.revoke(session_id).await.map_err(|e| match e {
            StoreError::NotFound => AuthError::InvalidToken,
            other => other.into(),
        })?;
        Ok(())
    }

    /// Current user
    pub async fn me(&self, user_id: Uuid) -> AuthResult<UserView> {
        self.users
            .find_by_id(user_id)
            .await?
            .map(|user| user.view())
            .ok_or(AuthError::UserNotFound)
    }

    /// `PENDING -> ACTIVE`
    ///
    /// Active users are returned unchanged; suspended users stay suspended.
    pub async fn activate(&self, user_id: Uuid) -> AuthResult<UserView> {
        let user = self
            .users
            .find_by_id(user_id)
            .await?
            .ok_or(AuthError::UserNotFound)?;

        match user.status {
            AccountStatus::Pending => {
                let user = self
                    .users
                    .update_status(user_id, AccountStatus::Active)
                    .await?;
                info!(user_id = %user_id, "User activated");
                Ok(user.view())
            }
            AccountStatus::Active => Ok(user.view()),
            AccountStatus::Suspended => Err(AuthError::AccountInactive),
        }
    }

    /// Replace the password and sign the user out everywhere
    pub async fn change_password(
        &self,
        user_id: Uuid,
        current_password: &str,
        new_password: &str,
    ) -> AuthResult<CookieDirective> {
        let user = self
            .users
            .find_by_id(user_id)
            .await?
            .ok_or(AuthError::UserNotFound)?;

        if !self
            .hasher
            .compare(current_password, &user.password_hash)
            .await
        {
            return Err(AuthError::InvalidCredentials);
        }
        validation::validate_password(new_password).map_err(AuthError::Validation)?;

        let password_hash = self.hasher.hash(new_password).await?;
        self.users
            .update_password_hash(user_id, &password_hash)
            .await?;
        let revoked = self.sessions.revoke_all_for_user(user_id).await?;

        info!(user_id = %user_id, revoked, "Password changed");
        Ok(CookieDirective::Clear)
    }

    /// Email first, username as fallback
    pub async fn resolve_identifier(&self, identifier: &str) -> AuthResult<Option<IdentifierMatch>> {
        if let Some(user) = self.users.find_by_email(identifier).await? {
            return Ok(Some(IdentifierMatch::Email(user)));
        }
        if let Some(user) = self.users.find_by_username(identifier).await? {
            return Ok(Some(IdentifierMatch::Username(user)));
        }
        Ok(None)
    }

    /// Delete sessions that expired before now
    pub async fn purge_expired_sessions(&self) -> AuthResult<u64> {
        Ok(self.sessions.purge_expired(Utc::now()).await?)
    }

    async fn start_session(
        &self,
        user: User,
        client: &ClientContext,
    ) -> AuthResult<Outcome<AuthResponse>> {
        let (access_token, cookie) = self.issue_pair(user.id, client).await?;
        Ok(Outcome {
            body: AuthResponse {
                user: user.view(),
                access_token,
            },
            cookie,
        })
    }

    async fn issue_pair(
        &self,
        user_id: Uuid,
        client: &ClientContext,
    ) -> AuthResult<(String, CookieDirective)> {
        let access_token = self.tokens.sign_access(user_id)?;
        let refresh_token = self.tokens.sign_refresh(user_id)?;
        let ttl = self.tokens.refresh_ttl_secs();
        let expires_at = i64::try_from(ttl)
            .ok()
            .and_then(Duration::try_seconds)
            .and_then(|lifetime| Utc::now().checked_add_signed(lifetime))
            .ok_or_else(|| AuthError::Internal("Refresh token lifetime out of range".to_string()))?;

        self.sessions
            .create(NewSession {
                user_id,
                refresh_token: refresh_token.clone(),
                ip_address: client.ip_address.clone(),
                device: client.device.clone(),
                expires_at,
            })
            .await?;

        Ok((
            access_token,
            CookieDirective::Set {
                value: refresh_token,
                max_age_secs: ttl,
            },
        ))
    }

    async fn burn_comparison(&self, password: &str) {
        let digest = self
            .dummy_digest
            .get_or_try_init(|| self.hasher.hash("unused-password"))
            .await;
        if let Ok(digest) = digest {
            self.hasher.compare(password, digest).await;
        }
    }
}
