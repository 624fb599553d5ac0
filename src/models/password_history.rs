//! Password history model - reuse detection only, never authentication.

use chrono::{DateTime, Utc};
use sqlx::FromRow;
use uuid::Uuid;

/// Retained history entries per identity; the oldest is pruned after each
/// insert.
pub const PASSWORD_HISTORY_DEPTH: usize = 5;

/// Password history entry.
#[derive(Debug, Clone, FromRow)]
pub struct PasswordHistoryEntry {
    pub history_id: Uuid,
    pub identity_id: Uuid,
    pub password_hash: String,
    pub created_utc: DateTime<Utc>,
}

impl PasswordHistoryEntry {
    pub fn new(identity_id: Uuid, password_hash: String, now: DateTime<Utc>) -> Self {
        Self {
            history_id: Uuid::new_v4(),
            identity_id,
            password_hash,
            created_utc: now,
        }
    }
}
