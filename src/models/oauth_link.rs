//! OAuth link model - third-party identity attachments.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

/// OAuth link entity.
///
/// Invariant: (provider_code, provider_user_id) is globally unique - at most
/// one identity per external account per provider.
#[derive(Debug, Clone, FromRow)]
pub struct OAuthLink {
    pub link_id: Uuid,
    pub identity_id: Uuid,
    pub tenant_id: Uuid,
    pub provider_code: String,
    pub provider_user_id: String,
    pub provider_email: String,
    pub profile_json: serde_json::Value,
    pub created_utc: DateTime<Utc>,
    pub updated_utc: DateTime<Utc>,
}

impl OAuthLink {
    pub fn new(
        identity_id: Uuid,
        tenant_id: Uuid,
        provider_code: String,
        provider_user_id: String,
        provider_email: String,
        profile_json: serde_json::Value,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            link_id: Uuid::new_v4(),
            identity_id,
            tenant_id,
            provider_code,
            provider_user_id,
            provider_email,
            profile_json,
            created_utc: now,
            updated_utc: now,
        }
    }
}

/// OAuth link response for API (no raw profile snapshot).
#[derive(Debug, Serialize, ToSchema)]
pub struct OAuthLinkResponse {
    pub provider_code: String,
    pub provider_email: String,
    pub created_utc: DateTime<Utc>,
}

impl From<OAuthLink> for OAuthLinkResponse {
    fn from(l: OAuthLink) -> Self {
        Self {
            provider_code: l.provider_code,
            provider_email: l.provider_email,
            created_utc: l.created_utc,
        }
    }
}
