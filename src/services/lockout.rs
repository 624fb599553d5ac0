//! Lockout guard.
//!
//! Per-account failed-attempt counter and lock state machine. After
//! `max_failed_attempts` consecutive failures the account locks for
//! `lock_duration`; the lock lifts lazily once the deadline passes. A
//! successful authentication resets the counter from any state.

use chrono::Duration;
use std::sync::Arc;
use uuid::Uuid;

use super::{SecurityAudit, ServiceError};
use crate::models::{Identity, RequestContext, SecurityEvent, SecurityEventType};
use crate::store::Store;
use crate::utils::Clock;

pub const DEFAULT_MAX_FAILED_ATTEMPTS: u32 = 5;
pub const DEFAULT_LOCK_MINUTES: i64 = 15;

#[derive(Clone)]
pub struct LockoutGuard {
    store: Arc<dyn Store>,
    audit: SecurityAudit,
    clock: Arc<dyn Clock>,
    max_failed_attempts: u32,
    lock_duration: Duration,
}

impl LockoutGuard {
    pub fn new(
        store: Arc<dyn Store>,
        audit: SecurityAudit,
        clock: Arc<dyn Clock>,
        max_failed_attempts: u32,
        lock_minutes: i64,
    ) -> Self {
        Self {
            store,
            audit,
            clock,
            max_failed_attempts,
            lock_duration: Duration::minutes(lock_minutes),
        }
    }

    /// Minutes remaining on an effective lock, None when not locked.
    /// Expired locks read as unlocked; the record is rewritten on the next
    /// attempt rather than by a sweep.
    pub async fn check_locked(&self, identity_id: Uuid) -> Result<Option<i64>, ServiceError> {
        let now = self.clock.now();
        let record = self.store.get_lockout(identity_id).await?;
        Ok(record.and_then(|r| r.remaining_minutes(now)))
    }

    /// Record a failed attempt. Emits `login_failed`, and `account_locked`
    /// when this attempt crosses the threshold. Returns the minutes of the
    /// newly imposed lock, if any.
    pub async fn record_failure(
        &self,
        identity: &Identity,
        ctx: &RequestContext,
    ) -> Result<Option<i64>, ServiceError> {
        let now = self.clock.now();
        let (record, became_locked) = self
            .store
            .record_lockout_failure(
                identity.identity_id,
                now,
                self.max_failed_attempts,
                self.lock_duration,
            )
            .await?;

        self.audit
            .record(SecurityEvent::new(
                SecurityEventType::LoginFailed,
                Some(identity.identity_id),
                Some(identity.tenant_id),
                ctx,
                Some(serde_json::json!({ "failed_count": record.failed_count })),
                now,
            ))
            .await;

        if became_locked {
            tracing::warn!(
                identity_id = %identity.identity_id,
                failed_count = record.failed_count,
                "Account locked after repeated failures"
            );
            self.audit
                .record(SecurityEvent::new(
                    SecurityEventType::AccountLocked,
                    Some(identity.identity_id),
                    Some(identity.tenant_id),
                    ctx,
                    Some(serde_json::json!({
                        "locked_until_utc": record.locked_until_utc,
                    })),
                    now,
                ))
                .await;
        }

        Ok(record.remaining_minutes(now))
    }

    /// Record a successful authentication: counter back to zero, lock gone.
    pub async fn record_success(&self, identity: &Identity) -> Result<(), ServiceError> {
        self.store
            .reset_lockout(identity.identity_id, self.clock.now())
            .await?;
        Ok(())
    }

    /// Explicit unlock, outside the normal success path.
    pub async fn unlock(
        &self,
        identity: &Identity,
        ctx: &RequestContext,
    ) -> Result<(), ServiceError> {
        let now = self.clock.now();
        self.store.reset_lockout(identity.identity_id, now).await?;
        self.audit
            .record(SecurityEvent::for_identity(
                SecurityEventType::AccountUnlocked,
                identity.identity_id,
                identity.tenant_id,
                ctx,
                now,
            ))
            .await;
        Ok(())
    }
}
