//! User model and related functionality

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use super::role::{AccountStatus, Role};

/// User entity
#[derive(Debug, Clone)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub role: Role,
    pub status: AccountStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// Projection that is safe to hand to clients
    pub fn view(&self) -> UserView {
        UserView {
            id: self.id,
            email: self.email.clone(),
            username: self.username.clone(),
            role: self.role,
            status: self.status,
        }
    }
}

/// New user creation payload
///
/// Email and username are expected to be normalized already.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub role: Role,
    pub status: AccountStatus,
}

/// Public representation of a user
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UserView {
    pub id: Uuid,
    pub email: String,
    pub username: String,
    pub role: Role,
    pub status: AccountStatus,
}
