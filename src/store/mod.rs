//! Storage abstraction.
//!
//! The domain services talk to a [`Store`] trait object; `PgStore` is the
//! PostgreSQL backend and `MemStore` an in-memory one used by tests and
//! local development. Methods that back a read-modify-write invariant
//! (lockout transitions, token consumption, recovery-code consumption) are
//! atomic within each backend.

mod memory;
mod postgres;

pub use memory::MemStore;
pub use postgres::PgStore;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use thiserror::Error;
use uuid::Uuid;

use crate::models::{
    EphemeralToken, Identity, LockoutRecord, OAuthLink, PasswordHistoryEntry, RecoveryCode,
    SecurityEvent, Session, Tenant,
};

#[derive(Debug, Error)]
pub enum StoreError {
    /// A uniqueness invariant was hit (duplicate email, duplicate provider
    /// link, ...). The payload names the violated key.
    #[error("Unique constraint violated: {0}")]
    UniqueViolation(&'static str),

    #[error("Database error: {0}")]
    Database(#[from] anyhow::Error),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        StoreError::Database(anyhow::Error::new(err))
    }
}

#[async_trait]
pub trait Store: Send + Sync {
    // ==================== Tenants ====================

    async fn find_tenant_by_label(&self, label: &str) -> Result<Option<Tenant>, StoreError>;

    async fn insert_tenant(&self, tenant: &Tenant) -> Result<(), StoreError>;

    // ==================== Identities ====================

    async fn find_identity(&self, identity_id: Uuid) -> Result<Option<Identity>, StoreError>;

    /// Case-insensitive email lookup within a tenant.
    async fn find_identity_by_email(
        &self,
        tenant_id: Uuid,
        email: &str,
    ) -> Result<Option<Identity>, StoreError>;

    /// Case-insensitive email lookup across tenants (login entry point).
    async fn find_identity_by_email_any_tenant(
        &self,
        email: &str,
    ) -> Result<Option<Identity>, StoreError>;

    async fn insert_identity(&self, identity: &Identity) -> Result<(), StoreError>;

    async fn update_password(
        &self,
        identity_id: Uuid,
        password_hash: &str,
        password_set: bool,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    async fn mark_email_verified(
        &self,
        identity_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    /// Rewrite the second-factor columns as one unit.
    async fn update_two_factor(
        &self,
        identity_id: Uuid,
        state_code: &str,
        secret_enc: Option<&[u8]>,
        confirmed_utc: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    // ==================== Lockout ====================

    async fn get_lockout(&self, identity_id: Uuid)
        -> Result<Option<LockoutRecord>, StoreError>;

    /// Apply one failed attempt under per-identity serialization.
    /// Returns the post-transition record and whether this attempt crossed
    /// the threshold into the locked state.
    async fn record_lockout_failure(
        &self,
        identity_id: Uuid,
        now: DateTime<Utc>,
        max_failed_attempts: u32,
        lock_duration: Duration,
    ) -> Result<(LockoutRecord, bool), StoreError>;

    /// Reset the counter to zero and clear any lock.
    async fn reset_lockout(&self, identity_id: Uuid, now: DateTime<Utc>)
        -> Result<(), StoreError>;

    // ==================== Password history ====================

    /// Most recent first.
    async fn list_password_history(
        &self,
        identity_id: Uuid,
        limit: u32,
    ) -> Result<Vec<PasswordHistoryEntry>, StoreError>;

    /// Insert an entry, then prune to the `keep` most recent for the
    /// identity (creation order, insertion order on ties).
    async fn push_password_history(
        &self,
        entry: &PasswordHistoryEntry,
        keep: u32,
    ) -> Result<(), StoreError>;

    // ==================== Security events ====================

    async fn append_security_event(&self, event: &SecurityEvent) -> Result<(), StoreError>;

    /// Most recent first.
    async fn list_security_events(
        &self,
        identity_id: Uuid,
        limit: u32,
    ) -> Result<Vec<SecurityEvent>, StoreError>;

    // ==================== Sessions ====================

    async fn insert_session(&self, session: &Session) -> Result<(), StoreError>;

    async fn find_session_by_token_hash(
        &self,
        token_hash: &str,
    ) -> Result<Option<Session>, StoreError>;

    async fn find_session(&self, session_id: Uuid) -> Result<Option<Session>, StoreError>;

    /// Sessions with no expiry or expiry in the future, newest activity first.
    async fn list_active_sessions(
        &self,
        identity_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Vec<Session>, StoreError>;

    async fn touch_session(&self, session_id: Uuid, now: DateTime<Utc>)
        -> Result<(), StoreError>;

    async fn expire_session(&self, session_id: Uuid, now: DateTime<Utc>)
        -> Result<(), StoreError>;

    /// Expire every active session for the identity except the one matching
    /// `keep_token_hash` (None = revoke all). Returns the number revoked.
    async fn expire_sessions_except(
        &self,
        identity_id: Uuid,
        keep_token_hash: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<u64, StoreError>;

    // ==================== OAuth links ====================

    async fn find_oauth_link(
        &self,
        provider_code: &str,
        provider_user_id: &str,
    ) -> Result<Option<OAuthLink>, StoreError>;

    async fn list_oauth_links(&self, identity_id: Uuid) -> Result<Vec<OAuthLink>, StoreError>;

    async fn insert_oauth_link(&self, link: &OAuthLink) -> Result<(), StoreError>;

    /// Refresh the stored provider-profile snapshot.
    async fn refresh_oauth_link(
        &self,
        link_id: Uuid,
        provider_email: &str,
        profile_json: &serde_json::Value,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    /// Returns false when no such link existed.
    async fn delete_oauth_link(
        &self,
        identity_id: Uuid,
        provider_code: &str,
    ) -> Result<bool, StoreError>;

    // ==================== Ephemeral tokens ====================

    /// Delete-then-insert: at most one live token per (subject, purpose).
    async fn replace_ephemeral_token(&self, token: &EphemeralToken) -> Result<(), StoreError>;

    async fn find_ephemeral_token(
        &self,
        subject_key: &str,
        purpose_code: &str,
    ) -> Result<Option<EphemeralToken>, StoreError>;

    async fn delete_ephemeral_token(
        &self,
        subject_key: &str,
        purpose_code: &str,
    ) -> Result<(), StoreError>;

    /// Atomic check-and-delete on the token hash: of two concurrent callers
    /// presenting the same token, at most one receives the record.
    async fn take_ephemeral_token(
        &self,
        subject_key: &str,
        purpose_code: &str,
        token_hash: &str,
    ) -> Result<Option<EphemeralToken>, StoreError>;

    // ==================== Recovery codes ====================

    /// Replace the identity's pool with a fresh set of codes.
    async fn replace_recovery_codes(
        &self,
        identity_id: Uuid,
        codes: &[RecoveryCode],
    ) -> Result<(), StoreError>;

    /// Atomically remove one matching unused code. Returns false when no
    /// code matched (wrong code, or already consumed).
    async fn consume_recovery_code(
        &self,
        identity_id: Uuid,
        code_hash: &str,
    ) -> Result<bool, StoreError>;

    async fn count_recovery_codes(&self, identity_id: Uuid) -> Result<i64, StoreError>;

    async fn clear_recovery_codes(&self, identity_id: Uuid) -> Result<(), StoreError>;
}
