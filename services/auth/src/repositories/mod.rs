//! Repositories for users and sessions
//!
//! The traits describe what the authentication core needs from durable
//! storage. `PgUserRepository` and `PgSessionRepository` back them with
//! PostgreSQL; the `memory` module keeps everything in process.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use crate::{
    error::ConflictField,
    models::{AccountStatus, NewSession, NewUser, Session, User},
};

pub mod memory;
pub mod session;
pub mod user;

pub use memory::{MemorySessionRepository, MemoryUserRepository};
pub use session::PgSessionRepository;
pub use user::PgUserRepository;

/// Storage failure
#[derive(Debug, Error)]
pub enum StoreError {
    /// A unique constraint rejected the write
    #[error("Unique constraint violated on {0}")]
    UniqueViolation(ConflictField),

    #[error("Record not found")]
    NotFound,

    /// The store could not be reached or failed the query
    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::RowNotFound => StoreError::NotFound,
            sqlx::Error::Database(db) if db.is_unique_violation() => match db.constraint() {
                Some("users_email_key") => StoreError::UniqueViolation(ConflictField::Email),
                Some("users_username_key") => StoreError::UniqueViolation(ConflictField::Username),
                _ => StoreError::Unavailable(err.to_string()),
            },
            _ => StoreError::Unavailable(err.to_string()),
        }
    }
}

/// Type alias for repository results
pub type StoreResult<T> = Result<T, StoreError>;

/// User records keyed by id, email and username
#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Insert a user; duplicates surface as `StoreError::UniqueViolation`
    async fn create(&self, new_user: NewUser) -> StoreResult<User>;

    async fn find_by_id(&self, id: Uuid) -> StoreResult<Option<User>>;

    async fn find_by_email(&self, email: &str) -> StoreResult<Option<User>>;

    async fn find_by_username(&self, username: &str) -> StoreResult<Option<User>>;

    /// Fails with `StoreError::NotFound` if the user does not exist
    async fn update_status(&self, id: Uuid, status: AccountStatus) -> StoreResult<User>;

    /// Fails with `StoreError::NotFound` if the user does not exist
    async fn update_password_hash(&self, id: Uuid, password_hash: &str) -> StoreResult<User>;
}

/// Refresh-token grants
#[async_trait]
pub trait SessionRepository: Send + Sync {
    async fn create(&self, new_session: NewSession) -> StoreResult<Session>;

    /// Look a session up by its refresh token. Expired and revoked rows are
    /// returned as well; callers decide whether the session is usable.
    async fn find_by_token(&self, refresh_token: &str) -> StoreResult<Option<Session>>;

    /// Revoke the non-revoked session(s) holding `refresh_token` and return
    /// how many were revoked. Zero is not an error.
    async fn revoke_by_token(&self, refresh_token: &str) -> StoreResult<u64>;

    /// Fails with `StoreError::NotFound` if the id does not exist
    async fn revoke(&self, session_id: Uuid) -> StoreResult<Session>;

    /// Revoke every non-revoked session of a user
    async fn revoke_all_for_user(&self, user_id: Uuid) -> StoreResult<u64>;

    /// Sessions of a user that are neither revoked nor expired at `now`
    async fn list_active_for_user(
        &self,
        user_id: Uuid,
        now: DateTime<Utc>,
    ) -> StoreResult<Vec<Session>>;

    /// Delete sessions that expired before `before`
    async fn purge_expired(&self, before: DateTime<Utc>) -> StoreResult<u64>;
}
