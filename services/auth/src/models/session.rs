//! Session model and related functionality

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

/// Session entity: the durable record behind one issued refresh token
#[derive(Debug, Clone)]
pub struct Session {
    pub id: Uuid,
    pub user_id: Uuid,
    pub refresh_token: String,
    pub ip_address: String,
    pub device: Option<String>,
    pub expires_at: DateTime<Utc>,
    pub revoked: bool,
    pub created_at: DateTime<Utc>,
}

impl Session {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }

    /// Not revoked and not yet expired
    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        !self.revoked && !self.is_expired_at(now)
    }

    /// Projection without the refresh token value
    pub fn view(&self) -> SessionView {
        SessionView {
            id: self.id,
            ip_address: self.ip_address.clone(),
            device: self.device.clone(),
            expires_at: self.expires_at,
            created_at: self.created_at,
        }
    }
}

/// New session creation payload
#[derive(Debug, Clone)]
pub struct NewSession {
    pub user_id: Uuid,
    pub refresh_token: String,
    pub ip_address: String,
    pub device: Option<String>,
    pub expires_at: DateTime<Utc>,
}

/// Session as listed to its owner
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionView {
    pub id: Uuid,
    pub ip_address: String,
    pub device: Option<String>,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}
