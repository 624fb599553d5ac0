//! Security audit log.
//!
//! Append-only recorder of security events. Recording never fails the
//! calling flow: storage errors are logged and swallowed.

use std::sync::Arc;
use uuid::Uuid;

use super::ServiceError;
use crate::models::{SecurityEvent, SecurityEventResponse};
use crate::store::Store;

#[derive(Clone)]
pub struct SecurityAudit {
    store: Arc<dyn Store>,
}

impl SecurityAudit {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Append a security event.
    pub async fn record(&self, event: SecurityEvent) {
        tracing::info!(
            event = %event.event_type_code,
            identity_id = ?event.identity_id,
            "Security event"
        );
        if let Err(e) = self.store.append_security_event(&event).await {
            tracing::error!(
                error = %e,
                event = %event.event_type_code,
                "Failed to write security event"
            );
        }
    }

    /// Recent security activity for one identity, newest first.
    pub async fn recent(
        &self,
        identity_id: Uuid,
        limit: u32,
    ) -> Result<Vec<SecurityEventResponse>, ServiceError> {
        let events = self.store.list_security_events(identity_id, limit).await?;
        Ok(events.into_iter().map(SecurityEventResponse::from).collect())
    }
}
