//! Session model - per-device bearer-token records.
//!
//! The session row is the only artifact that proves an issued token is still
//! valid; tokens themselves are opaque and stored only as SHA-256 hashes.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

/// Session entity.
#[derive(Debug, Clone, FromRow)]
pub struct Session {
    pub session_id: Uuid,
    pub identity_id: Uuid,
    pub tenant_id: Uuid,
    pub token_hash: String,
    pub device_name: Option<String>,
    pub device_type: Option<String>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub last_activity_utc: DateTime<Utc>,
    /// None = lives until revoked; revocation sets this to "now".
    pub expiry_utc: Option<DateTime<Utc>>,
    pub created_utc: DateTime<Utc>,
}

impl Session {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        identity_id: Uuid,
        tenant_id: Uuid,
        token_hash: String,
        device_name: Option<String>,
        device_type: Option<String>,
        ip_address: Option<String>,
        user_agent: Option<String>,
        expiry_utc: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            session_id: Uuid::new_v4(),
            identity_id,
            tenant_id,
            token_hash,
            device_name,
            device_type,
            ip_address,
            user_agent,
            last_activity_utc: now,
            expiry_utc,
            created_utc: now,
        }
    }

    /// Active = no expiry, or expiry still in the future.
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        self.expiry_utc.map_or(true, |expiry| expiry > now)
    }
}

/// Session info for API responses.
#[derive(Debug, Serialize, ToSchema)]
pub struct SessionInfo {
    pub session_id: Uuid,
    pub device_name: Option<String>,
    pub device_type: Option<String>,
    pub ip_address: Option<String>,
    pub last_activity_utc: DateTime<Utc>,
    pub created_utc: DateTime<Utc>,
    pub is_current: bool,
}

impl SessionInfo {
    pub fn from_session(s: &Session, current_token_hash: &str) -> Self {
        Self {
            session_id: s.session_id,
            device_name: s.device_name.clone(),
            device_type: s.device_type.clone(),
            ip_address: s.ip_address.clone(),
            last_activity_utc: s.last_activity_utc,
            created_utc: s.created_utc,
            is_current: s.token_hash == current_token_hash,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn session(expiry: Option<DateTime<Utc>>, now: DateTime<Utc>) -> Session {
        Session::new(
            Uuid::new_v4(),
            Uuid::new_v4(),
            "hash".to_string(),
            None,
            None,
            None,
            None,
            expiry,
            now,
        )
    }

    #[test]
    fn test_no_expiry_is_active() {
        let now = Utc::now();
        assert!(session(None, now).is_active(now + Duration::days(365)));
    }

    #[test]
    fn test_expiry_boundary() {
        let now = Utc::now();
        let s = session(Some(now + Duration::hours(1)), now);

        assert!(s.is_active(now));
        assert!(!s.is_active(now + Duration::hours(1)));
        assert!(!s.is_active(now + Duration::hours(2)));
    }
}
