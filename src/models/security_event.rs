//! Security event model - append-only security and compliance log.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Security event types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SecurityEventType {
    LoginSuccess,
    LoginFailed,
    AccountLocked,
    AccountUnlocked,
    PasswordChanged,
    PasswordReset,
    UserRegistered,
    EmailVerified,
    TwoFactorEnabled,
    TwoFactorDisabled,
    RecoveryCodeUsed,
    RecoveryCodesRegenerated,
    OauthConnected,
    OauthDisconnected,
    SessionRevoked,
}

impl SecurityEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SecurityEventType::LoginSuccess => "login_success",
            SecurityEventType::LoginFailed => "login_failed",
            SecurityEventType::AccountLocked => "account_locked",
            SecurityEventType::AccountUnlocked => "account_unlocked",
            SecurityEventType::PasswordChanged => "password_changed",
            SecurityEventType::PasswordReset => "password_reset",
            SecurityEventType::UserRegistered => "user_registered",
            SecurityEventType::EmailVerified => "email_verified",
            SecurityEventType::TwoFactorEnabled => "two_factor_enabled",
            SecurityEventType::TwoFactorDisabled => "two_factor_disabled",
            SecurityEventType::RecoveryCodeUsed => "recovery_code_used",
            SecurityEventType::RecoveryCodesRegenerated => "recovery_codes_regenerated",
            SecurityEventType::OauthConnected => "oauth_connected",
            SecurityEventType::OauthDisconnected => "oauth_disconnected",
            SecurityEventType::SessionRevoked => "session_revoked",
        }
    }
}

/// Request context attached to security events.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

impl RequestContext {
    pub fn new(ip_address: impl Into<String>, user_agent: impl Into<String>) -> Self {
        Self {
            ip_address: Some(ip_address.into()),
            user_agent: Some(user_agent.into()),
        }
    }
}

/// Security event entity. Append-only; never mutated or deleted by normal
/// flows.
#[derive(Debug, Clone, FromRow)]
pub struct SecurityEvent {
    pub event_id: Uuid,
    /// Nullable: some events precede identity resolution.
    pub identity_id: Option<Uuid>,
    pub tenant_id: Option<Uuid>,
    pub event_type_code: String,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub event_data: Option<serde_json::Value>,
    pub created_utc: DateTime<Utc>,
}

impl SecurityEvent {
    pub fn new(
        event_type: SecurityEventType,
        identity_id: Option<Uuid>,
        tenant_id: Option<Uuid>,
        ctx: &RequestContext,
        event_data: Option<serde_json::Value>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            identity_id,
            tenant_id,
            event_type_code: event_type.as_str().to_string(),
            ip_address: ctx.ip_address.clone(),
            user_agent: ctx.user_agent.clone(),
            event_data,
            created_utc: now,
        }
    }

    /// Event attributed to a resolved identity.
    pub fn for_identity(
        event_type: SecurityEventType,
        identity_id: Uuid,
        tenant_id: Uuid,
        ctx: &RequestContext,
        now: DateTime<Utc>,
    ) -> Self {
        Self::new(event_type, Some(identity_id), Some(tenant_id), ctx, None, now)
    }
}

/// Security event response for API.
#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct SecurityEventResponse {
    pub event_id: Uuid,
    pub event_type_code: String,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub event_data: Option<serde_json::Value>,
    pub created_utc: DateTime<Utc>,
}

impl From<SecurityEvent> for SecurityEventResponse {
    fn from(e: SecurityEvent) -> Self {
        Self {
            event_id: e.event_id,
            event_type_code: e.event_type_code,
            ip_address: e.ip_address,
            user_agent: e.user_agent,
            event_data: e.event_data,
            created_utc: e.created_utc,
        }
    }
}
