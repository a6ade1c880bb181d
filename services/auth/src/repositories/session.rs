//! PostgreSQL session repository

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row, postgres::PgRow};
use tracing::info;
use uuid::Uuid;

use super::{SessionRepository, StoreError, StoreResult};
use crate::models::{NewSession, Session};

const SESSION_COLUMNS: &str =
    "id, user_id, refresh_token, ip_address, device, expires_at, revoked, created_at";

/// Session repository
#[derive(Clone)]
pub struct PgSessionRepository {
    pool: PgPool,
}

impl PgSessionRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn session_from_row(row: &PgRow) -> StoreResult<Session> {
    Ok(Session {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        refresh_token: row.try_get("refresh_token")?,
        ip_address: row.try_get("ip_address")?,
        device: row.try_get("device")?,
        expires_at: row.try_get("expires_at")?,
        revoked: row.try_get("revoked")?,
        created_at: row.try_get("created_at")?,
    })
}

#[async_trait]
impl SessionRepository for PgSessionRepository {
    async fn create(&self, new_session: NewSession) -> StoreResult<Session> {
        let query = format!(
            "INSERT INTO sessions (user_id, refresh_token, ip_address, device, expires_at) \
             VALUES ($1, $2, $3, $4, $5) RETURNING {}",
            SESSION_COLUMNS
        );
        let row = sqlx::query(&query)
            .bind(new_session.user_id)
            .bind(&new_session.refresh_token)
            .bind(&new_session.ip_address)
            .bind(&new_session.device)
            .bind(new_session.expires_at)
            .fetch_one(&self.pool)
            .await?;

        session_from_row(&row)
    }

    async fn find_by_token(&self, refresh_token: &str) -> StoreResult<Option<Session>> {
        let query = format!(
            "SELECT {} FROM sessions WHERE refresh_token = $1",
            SESSION_COLUMNS
        );
        let row = sqlx::query(&query)
            .bind(refresh_token)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(session_from_row).transpose()
    }

    async fn revoke_by_token(&self, refresh_token: &str) -> StoreResult<u64> {
        let result = sqlx::query(
            "UPDATE sessions SET revoked = TRUE WHERE refresh_token = $1 AND revoked = FALSE",
        )
        .bind(refresh_token)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    async fn revoke(&self, session_id: Uuid) -> StoreResult<Session> {
        let query = format!(
            "UPDATE sessions SET revoked = TRUE WHERE id = $1 RETURNING {}",
            SESSION_COLUMNS
        );
        let row = sqlx::query(&query)
            .bind(session_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(StoreError::NotFound)?;

        session_from_row(&row)
    }

    async fn revoke_all_for_user(&self, user_id: Uuid) -> StoreResult<u64> {
        info!("Revoking all sessions for user: {}", user_id);

        let result = sqlx::query(
            "UPDATE sessions SET revoked = TRUE WHERE user_id = $1 AND revoked = FALSE",
        )
        .bind(user_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    async fn list_active_for_user(
        &self,
        user_id: Uuid,
        now: DateTime<Utc>,
    ) -> StoreResult<Vec<Session>> {
        let query = format!(
            "SELECT {} FROM sessions \
             WHERE user_id = $1 AND revoked = FALSE AND expires_at > $2 \
             ORDER BY created_at DESC",
            SESSION_COLUMNS
        );
        let rows = sqlx::query(&query)
            .bind(user_id)
            .bind(now)
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(session_from_row).collect()
    }

    async fn purge_expired(&self, before: DateTime<Utc>) -> StoreResult<u64> {
        let result = sqlx::query("DELETE FROM sessions WHERE expires_at <= $1")
            .bind(before)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }
}
