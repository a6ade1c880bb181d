//! In-process repositories
//!
//! Same contracts as the PostgreSQL repositories, including the unique
//! constraints on email, username and refresh token. Used by the test
//! suites and for running the service without a database.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{SessionRepository, StoreError, StoreResult, UserRepository};
use crate::{
    error::ConflictField,
    models::{AccountStatus, NewSession, NewUser, Session, User},
};

#[derive(Clone, Default)]
pub struct MemoryUserRepository {
    users: Arc<Mutex<HashMap<Uuid, User>>>,
}

impl MemoryUserRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored users
    pub async fn len(&self) -> usize {
        self.users.lock().await.len()
    }

    /// Remove a user outright; the service itself never deletes users
    pub async fn remove(&self, id: Uuid) -> Option<User> {
        self.users.lock().await.remove(&id)
    }
}

#[async_trait]
impl UserRepository for MemoryUserRepository {
    async fn create(&self, new_user: NewUser) -> StoreResult<User> {
        let mut users = self.users.lock().await;

        if users.values().any(|u| u.email == new_user.email) {
            return Err(StoreError::UniqueViolation(ConflictField::Email));
        }
        if users.values().any(|u| u.username == new_user.username) {
            return Err(StoreError::UniqueViolation(ConflictField::Username));
        }

        let now = Utc::now();
        let user = User {
            id: Uuid::new_v4(),
            username: new_user.username,
            email: new_user.email,
            password_hash: new_user.password_hash,
            role: new_user.role,
            status: new_user.status,
            created_at: now,
            updated_at: now,
        };
        users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn find_by_id(&self, id: Uuid) -> StoreResult<Option<User>> {
        Ok(self.users.lock().await.get(&id).cloned())
    }

    async fn find_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        let users = self.users.lock().await;
        Ok(users.values().find(|u| u.email == email).cloned())
    }

    async fn find_by_username(&self, username: &str) -> StoreResult<Option<User>> {
        let users = self.users.lock().await;
        Ok(users.values().find(|u| u.username == username).cloned())
    }

    async fn update_status(&self, id: Uuid, status: AccountStatus) -> StoreResult<User> {
        let mut users = self.users.lock().await;
        let user = users.get_mut(&id).ok_or(StoreError::NotFound)?;
        user.status = status;
        user.updated_at = Utc::now();
        Ok(user.clone())
    }

    async fn update_password_hash(&self, id: Uuid, password_hash: &str) -> StoreResult<User> {
        let mut users = self.users.lock().await;
        let user = users.get_mut(&id).ok_or(StoreError::NotFound)?;
        user.password_hash = password_hash.to_string();
        user.updated_at = Utc::now();
        Ok(user.clone())
    }
}

#[derive(Default)]
struct SessionTable {
    rows: HashMap<Uuid, Session>,
    by_token: HashMap<String, Uuid>,
}

#[derive(Clone, Default)]
pub struct MemorySessionRepository {
    table: Arc<Mutex<SessionTable>>,
}

impl MemorySessionRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored sessions, revoked and expired ones included
    pub async fn len(&self) -> usize {
        self.table.lock().await.rows.len()
    }
}

#[async_trait]
impl SessionRepository for MemorySessionRepository {
    async fn create(&self, new_session: NewSession) -> StoreResult<Session> {
        let mut table = self.table.lock().await;

        if table.by_token.contains_key(&new_session.refresh_token) {
            return Err(StoreError::Unavailable(
                "duplicate refresh token".to_string(),
            ));
        }

        let session = Session {
            id: Uuid::new_v4(),
            user_id: new_session.user_id,
            refresh_token: new_session.refresh_token,
            ip_address: new_session.ip_address,
            device: new_session.device,
            expires_at: new_session.expires_at,
            revoked: false,
            created_at: Utc::now(),
        };
        table
            .by_token
            .insert(session.refresh_token.clone(), session.id);
        table.rows.insert(session.id, session.clone());
        Ok(session)
    }

    async fn find_by_token(&self, refresh_token: &str) -> StoreResult<Option<Session>> {
        let table = self.table.lock().await;
        Ok(table
            .by_token
            .get(refresh_token)
            .and_then(|id| table.rows.get(id))
            .cloned())
    }

    async fn revoke_by_token(&self, refresh_token: &str) -> StoreResult<u64> {
        let mut table = self.table.lock().await;
        let Some(id) = table.by_token.get(refresh_token).copied() else {
            return Ok(0);
        };

        match table.rows.get_mut(&id) {
            Some(session) if !session.revoked => {
                session.revoked = true;
                Ok(1)
            }
            _ => Ok(0),
        }
    }

    async fn revoke(&self, session_id: Uuid) -> StoreResult<Session> {
        let mut table = self.table.lock().await;
        let session = table.rows.get_mut(&session_id).ok_or(StoreError::NotFound)?;
        session.revoked = true;
        Ok(session.clone())
    }

    async fn revoke_all_for_user(&self, user_id: Uuid) -> StoreResult<u64> {
        let mut table = self.table.lock().await;
        let mut revoked = 0;
        for session in table.rows.values_mut() {
            if session.user_id == user_id && !session.revoked {
                session.revoked = true;
                revoked += 1;
            }
        }
        Ok(revoked)
    }

    async fn list_active_for_user(
        &self,
        user_id: Uuid,
        now: DateTime<Utc>,
    ) -> StoreResult<Vec<Session>> {
        let table = self.table.lock().await;
        let mut sessions: Vec<Session> = table
            .rows
            .values()
            .filter(|s| s.user_id == user_id && s.is_active_at(now))
            .cloned()
            .collect();
        sessions.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(sessions)
    }

    async fn purge_expired(&self, before: DateTime<Utc>) -> StoreResult<u64> {
        let mut table = self.table.lock().await;
        let expired: Vec<Uuid> = table
            .rows
            .values()
            .filter(|s| s.expires_at <= before)
            .map(|s| s.id)
            .collect();

        for id in &expired {
            if let Some(session) = table.rows.remove(id) {
                table.by_token.remove(&session.refresh_token);
            }
        }
        Ok(expired.len() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Role;
    use chrono::Duration;

    fn new_user(username: &str, email: &str) -> NewUser {
        NewUser {
            username: username.to_string(),
            email: email.to_string(),
            password_hash: "hash".to_string(),
            role: Role::User,
            status: AccountStatus::Active,
        }
    }

    fn new_session(user_id: Uuid, token: &str, expires_at: DateTime<Utc>) -> NewSession {
        NewSession {
            user_id,
            refresh_token: token.to_string(),
            ip_address: "10.0.0.1".to_string(),
            device: Some("test-agent".to_string()),
            expires_at,
        }
    }

    #[tokio::test]
    async fn user_uniqueness_reports_email_first() {
        let repo = MemoryUserRepository::new();
        repo.create(new_user("alice01", "a@x.com")).await.unwrap();

        let err = repo.create(new_user("alice01", "a@x.com")).await.unwrap_err();
        assert!(matches!(err, StoreError::UniqueViolation(ConflictField::Email)));

        let err = repo.create(new_user("alice01", "b@x.com")).await.unwrap_err();
        assert!(matches!(
            err,
            StoreError::UniqueViolation(ConflictField::Username)
        ));
        assert_eq!(repo.len().await, 1);
    }

    #[tokio::test]
    async fn update_status_of_unknown_user_is_not_found() {
        let repo = MemoryUserRepository::new();
        let err = repo
            .update_status(Uuid::new_v4(), AccountStatus::Active)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound));
    }

    #[tokio::test]
    async fn find_by_token_returns_expired_rows() {
        let repo = MemorySessionRepository::new();
        let user_id = Uuid::new_v4();
        let past = Utc::now() - Duration::minutes(5);
        repo.create(new_session(user_id, "old", past)).await.unwrap();

        let found = repo.find_by_token("old").await.unwrap().unwrap();
        assert!(found.is_expired_at(Utc::now()));
        assert!(repo.find_by_token("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn duplicate_token_is_rejected() {
        let repo = MemorySessionRepository::new();
        let expires = Utc::now() + Duration::days(1);
        repo.create(new_session(Uuid::new_v4(), "t", expires))
            .await
            .unwrap();
        assert!(repo
            .create(new_session(Uuid::new_v4(), "t", expires))
            .await
            .is_err());
    }

    #[tokio::test]
    async fn revoke_by_token_is_idempotent() {
        let repo = MemorySessionRepository::new();
        let expires = Utc::now() + Duration::days(1);
        repo.create(new_session(Uuid::new_v4(), "t", expires))
            .await
            .unwrap();

        assert_eq!(repo.revoke_by_token("t").await.unwrap(), 1);
        assert_eq!(repo.revoke_by_token("t").await.unwrap(), 0);
        assert_eq!(repo.revoke_by_token("unknown").await.unwrap(), 0);
        assert!(repo.find_by_token("t").await.unwrap().unwrap().revoked);
    }

    #[tokio::test]
    async fn revoke_by_id() {
        let repo = MemorySessionRepository::new();
        let session = repo
            .create(new_session(Uuid::new_v4(), "t", Utc::now() + Duration::days(1)))
            .await
            .unwrap();

        assert!(repo.revoke(session.id).await.unwrap().revoked);
        assert!(matches!(
            repo.revoke(Uuid::new_v4()).await,
            Err(StoreError::NotFound)
        ));
    }

    #[tokio::test]
    async fn list_revoke_all_and_purge() {
        let repo = MemorySessionRepository::new();
        let user_id = Uuid::new_v4();
        let now = Utc::now();

        repo.create(new_session(user_id, "a", now + Duration::days(1)))
            .await
            .unwrap();
        repo.create(new_session(user_id, "b", now + Duration::days(1)))
            .await
            .unwrap();
        repo.create(new_session(user_id, "c", now - Duration::days(1)))
            .await
            .unwrap();
        repo.create(new_session(Uuid::new_v4(), "d", now + Duration::days(1)))
            .await
            .unwrap();

        assert_eq!(repo.list_active_for_user(user_id, now).await.unwrap().len(), 2);
        assert_eq!(repo.purge_expired(now).await.unwrap(), 1);
        assert!(repo.find_by_token("c").await.unwrap().is_none());

        assert_eq!(repo.revoke_all_for_user(user_id).await.unwrap(), 2);
        assert!(repo.list_active_for_user(user_id, now).await.unwrap().is_empty());
        assert_eq!(repo.len().await, 3);
    }
}
