//! Tenant model - minimal scope root for identities.

use chrono::{DateTime, Utc};
use sqlx::FromRow;
use uuid::Uuid;

/// Tenant entity. The service only needs enough of the tenant to scope
/// identities and to resolve-or-create a default tenant for OAuth signups.
#[derive(Debug, Clone, FromRow)]
pub struct Tenant {
    pub tenant_id: Uuid,
    pub tenant_label: String,
    pub created_utc: DateTime<Utc>,
}

impl Tenant {
    pub fn new(tenant_label: String, now: DateTime<Utc>) -> Self {
        Self {
            tenant_id: Uuid::new_v4(),
            tenant_label,
            created_utc: now,
        }
    }
}

/// Label of the tenant that absorbs OAuth signups with no tenant context.
pub const DEFAULT_TENANT_LABEL: &str = "default";
