//! Session registry.
//!
//! Per-device session records behind opaque bearer tokens. The session row
//! is the only proof a token is still valid: issuance creates token and row
//! as one unit, revocation sets the expiry to "now".

use chrono::Duration;
use std::sync::Arc;
use uuid::Uuid;

use super::{SecurityAudit, ServiceError};
use crate::models::{Identity, RequestContext, SecurityEvent, SecurityEventType, Session};
use crate::store::Store;
use crate::utils::{generate_token, hash_token, Clock};

#[derive(Clone)]
pub struct SessionRegistry {
    store: Arc<dyn Store>,
    audit: SecurityAudit,
    clock: Arc<dyn Clock>,
    /// 0 = sessions never expire on their own.
    session_ttl_days: i64,
}

impl SessionRegistry {
    pub fn new(
        store: Arc<dyn Store>,
        audit: SecurityAudit,
        clock: Arc<dyn Clock>,
        session_ttl_days: i64,
    ) -> Self {
        Self {
            store,
            audit,
            clock,
            session_ttl_days,
        }
    }

    /// Create a new opaque token and its backing session row as one unit.
    /// Never overwrites an existing session.
    pub async fn issue(
        &self,
        identity: &Identity,
        device_name: Option<String>,
        device_type: Option<String>,
        ctx: &RequestContext,
    ) -> Result<(String, Session), ServiceError> {
        let now = self.clock.now();
        let expiry = if self.session_ttl_days > 0 {
            Some(now + Duration::days(self.session_ttl_days))
        } else {
            None
        };

        let token = generate_token();
        let session = Session::new(
            identity.identity_id,
            identity.tenant_id,
            hash_token(&token),
            device_name,
            device_type,
            ctx.ip_address.clone(),
            ctx.user_agent.clone(),
            expiry,
            now,
        );
        self.store.insert_session(&session).await?;

        tracing::info!(
            identity_id = %identity.identity_id,
            session_id = %session.session_id,
            "Session issued"
        );

        Ok((token, session))
    }

    /// Resolve a presented bearer token to its identity and session.
    ///
    /// The activity stamp is refreshed best-effort; a lost update is
    /// acceptable, the stamp is advisory telemetry.
    pub async fn authenticate(
        &self,
        token: &str,
    ) -> Result<Option<(Identity, Session)>, ServiceError> {
        let now = self.clock.now();
        let session = match self
            .store
            .find_session_by_token_hash(&hash_token(token))
            .await?
        {
            Some(s) if s.is_active(now) => s,
            _ => return Ok(None),
        };

        let identity = match self.store.find_identity(session.identity_id).await? {
            Some(i) => i,
            None => return Ok(None),
        };

        if let Err(e) = self.store.touch_session(session.session_id, now).await {
            tracing::warn!(error = %e, session_id = %session.session_id, "Session touch failed");
        }

        Ok(Some((identity, session)))
    }

    /// Sessions with no expiry or expiry in the future, newest activity first.
    pub async fn list_active(&self, identity_id: Uuid) -> Result<Vec<Session>, ServiceError> {
        Ok(self
            .store
            .list_active_sessions(identity_id, self.clock.now())
            .await?)
    }

    /// Refresh the activity stamp. Idempotent, safe on every request.
    pub async fn touch(&self, session_id: Uuid) -> Result<(), ServiceError> {
        self.store.touch_session(session_id, self.clock.now()).await?;
        Ok(())
    }

    /// Revoke one session; subsequent presentation of its token is rejected.
    pub async fn revoke(
        &self,
        identity: &Identity,
        session_id: Uuid,
        ctx: &RequestContext,
    ) -> Result<(), ServiceError> {
        let session = self
            .store
            .find_session(session_id)
            .await?
            .filter(|s| s.identity_id == identity.identity_id)
            .ok_or(ServiceError::NotFound)?;

        let now = self.clock.now();
        self.store.expire_session(session.session_id, now).await?;

        self.audit
            .record(SecurityEvent::new(
                SecurityEventType::SessionRevoked,
                Some(identity.identity_id),
                Some(identity.tenant_id),
                ctx,
                Some(serde_json::json!({ "session_id": session.session_id, "scope": "one" })),
                now,
            ))
            .await;

        Ok(())
    }

    /// Revoke every session for the identity except the one presenting
    /// `current_token_hash`. Returns the number revoked.
    pub async fn revoke_others(
        &self,
        identity: &Identity,
        current_token_hash: &str,
        ctx: &RequestContext,
    ) -> Result<u64, ServiceError> {
        let now = self.clock.now();
        let revoked = self
            .store
            .expire_sessions_except(identity.identity_id, Some(current_token_hash), now)
            .await?;

        if revoked > 0 {
            self.audit
                .record(SecurityEvent::new(
                    SecurityEventType::SessionRevoked,
                    Some(identity.identity_id),
                    Some(identity.tenant_id),
                    ctx,
                    Some(serde_json::json!({ "revoked": revoked, "scope": "others" })),
                    now,
                ))
                .await;
        }

        Ok(revoked)
    }

    /// "Log out everywhere": revoke every session including the caller's own.
    pub async fn revoke_all(
        &self,
        identity: &Identity,
        ctx: &RequestContext,
    ) -> Result<u64, ServiceError> {
        let now = self.clock.now();
        let revoked = self
            .store
            .expire_sessions_except(identity.identity_id, None, now)
            .await?;

        self.audit
            .record(SecurityEvent::new(
                SecurityEventType::SessionRevoked,
                Some(identity.identity_id),
                Some(identity.tenant_id),
                ctx,
                Some(serde_json::json!({ "revoked": revoked, "scope": "all" })),
                now,
            ))
            .await;

        Ok(revoked)
    }
}
