//! PostgreSQL user repository

use async_trait::async_trait;
use sqlx::{PgPool, Row, postgres::PgRow};
use tracing::info;
use uuid::Uuid;

use super::{StoreError, StoreResult, UserRepository};
use crate::models::{AccountStatus, NewUser, Role, User};

const USER_COLUMNS: &str =
    "id, username, email, password_hash, role, status, created_at, updated_at";

/// User repository
#[derive(Clone)]
pub struct PgUserRepository {
    pool: PgPool,
}

impl PgUserRepository {
    /// Create a new user repository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn find_one(&self, column: &str, value: &str) -> StoreResult<Option<User>> {
        let query = format!("SELECT {} FROM users WHERE {} = $1", USER_COLUMNS, column);
        let row = sqlx::query(&query)
            .bind(value)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(user_from_row).transpose()
    }
}

fn user_from_row(row: &PgRow) -> StoreResult<User> {
    let role: String = row.try_get("role")?;
    let status: String = row.try_get("status")?;

    Ok(User {
        id: row.try_get("id")?,
        username: row.try_get("username")?,
        email: row.try_get("email")?,
        password_hash: row.try_get("password_hash")?,
        role: role.parse::<Role>().map_err(StoreError::Unavailable)?,
        status: status.parse::<AccountStatus>().map_err(StoreError::Unavailable)?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

#[async_trait]
impl UserRepository for PgUserRepository {
    async fn create(&self, new_user: NewUser) -> StoreResult<User> {
        info!("Creating new user: {}", new_user.username);

        let query = format!(
            "INSERT INTO users (username, email, password_hash, role, status) \
             VALUES ($1, $2, $3, $4, $5) RETURNING {}",
            USER_COLUMNS
        );
        let row = sqlx::query(&query)
            .bind(&new_user.username)
            .bind(&new_user.email)
            .bind(&new_user.password_hash)
            .bind(new_user.role.as_str())
            .bind(new_user.status.as_str())
            .fetch_one(&self.pool)
            .await?;

        user_from_row(&row)
    }

    async fn find_by_id(&self, id: Uuid) -> StoreResult<Option<User>> {
        let query = format!("SELECT {} FROM users WHERE id = $1", USER_COLUMNS);
        let row = sqlx::query(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(user_from_row).transpose()
    }

    async fn find_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        self.find_one("email", email).await
    }

    async fn find_by_username(&self, username: &str) -> StoreResult<Option<User>> {
        self.find_one("username", username).await
    }

    async fn update_status(&self, id: Uuid, status: AccountStatus) -> StoreResult<User> {
        info!("Setting status of user {} to {}", id, status);

        let query = format!(
            "UPDATE users SET status = $2, updated_at = now() WHERE id = $1 RETURNING {}",
            USER_COLUMNS
        );
        let row = sqlx::query(&query)
            .bind(id)
            .bind(status.as_str())
            .fetch_optional(&self.pool)
            .await?
            .ok_or(StoreError::NotFound)?;

        user_from_row(&row)
    }

    async fn update_password_hash(&self, id: Uuid, password_hash: &str) -> StoreResult<User> {
        let query = format!(
            "UPDATE users SET password_hash = $2, updated_at = now() WHERE id = $1 RETURNING {}",
            USER_COLUMNS
        );
        let row = sqlx::query(&query)
            .bind(id)
            .bind(password_hash)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(StoreError::NotFound)?;

        user_from_row(&row)
    }
}
