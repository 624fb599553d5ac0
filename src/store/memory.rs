//! In-memory store.
//!
//! Backs the integration tests and local development. A single async mutex
//! guards the state, which trivially serializes every read-modify-write the
//! trait contract requires.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{Store, StoreError};
use crate::models::{
    EphemeralToken, Identity, LockoutRecord, OAuthLink, PasswordHistoryEntry, RecoveryCode,
    SecurityEvent, Session, Tenant,
};

#[derive(Default)]
struct Inner {
    tenants: Vec<Tenant>,
    identities: Vec<Identity>,
    lockouts: HashMap<Uuid, LockoutRecord>,
    // Push order doubles as insertion order for history pruning ties.
    history: Vec<PasswordHistoryEntry>,
    events: Vec<SecurityEvent>,
    sessions: Vec<Session>,
    links: Vec<OAuthLink>,
    tokens: Vec<EphemeralToken>,
    recovery_codes: Vec<RecoveryCode>,
}

#[derive(Default)]
pub struct MemStore {
    inner: Mutex<Inner>,
}

impl MemStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemStore {
    // ==================== Tenants ====================

    async fn find_tenant_by_label(&self, label: &str) -> Result<Option<Tenant>, StoreError> {
        let inner = self.inner.lock().await;
        Ok(inner
            .tenants
            .iter()
            .find(|t| t.tenant_label == label)
            .cloned())
    }

    async fn insert_tenant(&self, tenant: &Tenant) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        if inner
            .tenants
            .iter()
            .any(|t| t.tenant_label == tenant.tenant_label)
        {
            return Err(StoreError::UniqueViolation("tenants_label"));
        }
        inner.tenants.push(tenant.clone());
        Ok(())
    }

    // ==================== Identities ====================

    async fn find_identity(&self, identity_id: Uuid) -> Result<Option<Identity>, StoreError> {
        let inner = self.inner.lock().await;
        Ok(inner
            .identities
            .iter()
            .find(|i| i.identity_id == identity_id)
            .cloned())
    }

    async fn find_identity_by_email(
        &self,
        tenant_id: Uuid,
        email: &str,
    ) -> Result<Option<Identity>, StoreError> {
        let inner = self.inner.lock().await;
        Ok(inner
            .identities
            .iter()
            .find(|i| i.tenant_id == tenant_id && i.email.eq_ignore_ascii_case(email))
            .cloned())
    }

    async fn find_identity_by_email_any_tenant(
        &self,
        email: &str,
    ) -> Result<Option<Identity>, StoreError> {
        let inner = self.inner.lock().await;
        Ok(inner
            .identities
            .iter()
            .find(|i| i.email.eq_ignore_ascii_case(email))
            .cloned())
    }

    async fn insert_identity(&self, identity: &Identity) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        if inner.identities.iter().any(|i| {
            i.tenant_id == identity.tenant_id && i.email.eq_ignore_ascii_case(&identity.email)
        }) {
            return Err(StoreError::UniqueViolation("identities_tenant_email"));
        }
        inner.identities.push(identity.clone());
        Ok(())
    }

    async fn update_password(
        &self,
        identity_id: Uuid,
        password_hash: &str,
        password_set: bool,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        if let Some(identity) = inner
            .identities
            .iter_mut()
            .find(|i| i.identity_id == identity_id)
        {
            identity.password_hash = password_hash.to_string();
            identity.password_set = password_set;
            identity.updated_utc = now;
        }
        Ok(())
    }

    async fn mark_email_verified(
        &self,
        identity_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        if let Some(identity) = inner
            .identities
            .iter_mut()
            .find(|i| i.identity_id == identity_id && i.email_verified_utc.is_none())
        {
            identity.email_verified_utc = Some(now);
            identity.updated_utc = now;
        }
        Ok(())
    }

    async fn update_two_factor(
        &self,
        identity_id: Uuid,
        state_code: &str,
        secret_enc: Option<&[u8]>,
        confirmed_utc: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        if let Some(identity) = inner
            .identities
            .iter_mut()
            .find(|i| i.identity_id == identity_id)
        {
            identity.totp_state_code = state_code.to_string();
            identity.totp_secret_enc = secret_enc.map(|s| s.to_vec());
            identity.totp_confirmed_utc = confirmed_utc;
            identity.updated_utc = now;
        }
        Ok(())
    }

    // ==================== Lockout ====================

    async fn get_lockout(
        &self,
        identity_id: Uuid,
    ) -> Result<Option<LockoutRecord>, StoreError> {
        let inner = self.inner.lock().await;
        Ok(inner.lockouts.get(&identity_id).cloned())
    }

    async fn record_lockout_failure(
        &self,
        identity_id: Uuid,
        now: DateTime<Utc>,
        max_failed_attempts: u32,
        lock_duration: Duration,
    ) -> Result<(LockoutRecord, bool), StoreError> {
        let mut inner = self.inner.lock().await;
        let existing = inner.lockouts.get(&identity_id).cloned();
        let (record, became_locked) = LockoutRecord::apply_failure(
            existing,
            identity_id,
            now,
            max_failed_attempts,
            lock_duration,
        );
        inner.lockouts.insert(identity_id, record.clone());
        Ok((record, became_locked))
    }

    async fn reset_lockout(
        &self,
        identity_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        inner
            .lockouts
            .insert(identity_id, LockoutRecord::apply_success(identity_id, now));
        Ok(())
    }

    // ==================== Password history ====================

    async fn list_password_history(
        &self,
        identity_id: Uuid,
        limit: u32,
    ) -> Result<Vec<PasswordHistoryEntry>, StoreError> {
        let inner = self.inner.lock().await;
        Ok(inner
            .history
            .iter()
            .filter(|e| e.identity_id == identity_id)
            .rev()
            .take(limit as usize)
            .cloned()
            .collect())
    }

    async fn push_password_history(
        &self,
        entry: &PasswordHistoryEntry,
        keep: u32,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        inner.history.push(entry.clone());

        let excess: Vec<Uuid> = {
            let for_identity: Vec<&PasswordHistoryEntry> = inner
                .history
                .iter()
                .filter(|e| e.identity_id == entry.identity_id)
                .collect();
            for_identity
                .iter()
                .rev()
                .skip(keep as usize)
                .map(|e| e.history_id)
                .collect()
        };
        inner.history.retain(|e| !excess.contains(&e.history_id));
        Ok(())
    }

    // ==================== Security events ====================

    async fn append_security_event(&self, event: &SecurityEvent) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        inner.events.push(event.clone());
        Ok(())
    }

    async fn list_security_events(
        &self,
        identity_id: Uuid,
        limit: u32,
    ) -> Result<Vec<SecurityEvent>, StoreError> {
        let inner = self.inner.lock().await;
        Ok(inner
            .events
            .iter()
            .filter(|e| e.identity_id == Some(identity_id))
            .rev()
            .take(limit as usize)
            .cloned()
            .collect())
    }

    // ==================== Sessions ====================

    async fn insert_session(&self, session: &Session) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        if inner.sessions.iter().any(|s| s.token_hash == session.token_hash) {
            return Err(StoreError::UniqueViolation("sessions_token_hash"));
        }
        inner.sessions.push(session.clone());
        Ok(())
    }

    async fn find_session_by_token_hash(
        &self,
        token_hash: &str,
    ) -> Result<Option<Session>, StoreError> {
        let inner = self.inner.lock().await;
        Ok(inner
            .sessions
            .iter()
            .find(|s| s.token_hash == token_hash)
            .cloned())
    }

    async fn find_session(&self, session_id: Uuid) -> Result<Option<Session>, StoreError> {
        let inner = self.inner.lock().await;
        Ok(inner
            .sessions
            .iter()
            .find(|s| s.session_id == session_id)
            .cloned())
    }

    async fn list_active_sessions(
        &self,
        identity_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Vec<Session>, StoreError> {
        let inner = self.inner.lock().await;
        let mut sessions: Vec<Session> = inner
            .sessions
            .iter()
            .filter(|s| s.identity_id == identity_id && s.is_active(now))
            .cloned()
            .collect();
        sessions.sort_by(|a, b| b.last_activity_utc.cmp(&a.last_activity_utc));
        Ok(sessions)
    }

    async fn touch_session(
        &self,
        session_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        if let Some(session) = inner
            .sessions
            .iter_mut()
            .find(|s| s.session_id == session_id)
        {
            session.last_activity_utc = now;
        }
        Ok(())
    }

    async fn expire_session(
        &self,
        session_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        if let Some(session) = inner
            .sessions
            .iter_mut()
            .find(|s| s.session_id == session_id)
        {
            session.expiry_utc = Some(now);
        }
        Ok(())
    }

    async fn expire_sessions_except(
        &self,
        identity_id: Uuid,
        keep_token_hash: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        let mut inner = self.inner.lock().await;
        let mut revoked = 0u64;
        for session in inner
            .sessions
            .iter_mut()
            .filter(|s| s.identity_id == identity_id && s.is_active(now))
        {
            if keep_token_hash == Some(session.token_hash.as_str()) {
                continue;
            }
            session.expiry_utc = Some(now);
            revoked += 1;
        }
        Ok(revoked)
    }

    // ==================== OAuth links ====================

    async fn find_oauth_link(
        &self,
        provider_code: &str,
        provider_user_id: &str,
    ) -> Result<Option<OAuthLink>, StoreError> {
        let inner = self.inner.lock().await;
        Ok(inner
            .links
            .iter()
            .find(|l| l.provider_code == provider_code && l.provider_user_id == provider_user_id)
            .cloned())
    }

    async fn list_oauth_links(&self, identity_id: Uuid) -> Result<Vec<OAuthLink>, StoreError> {
        let inner = self.inner.lock().await;
        Ok(inner
            .links
            .iter()
            .filter(|l| l.identity_id == identity_id)
            .cloned()
            .collect())
    }

    async fn insert_oauth_link(&self, link: &OAuthLink) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        if inner.links.iter().any(|l| {
            l.provider_code == link.provider_code && l.provider_user_id == link.provider_user_id
        }) {
            return Err(StoreError::UniqueViolation("oauth_links_provider_user"));
        }
        inner.links.push(link.clone());
        Ok(())
    }

    async fn refresh_oauth_link(
        &self,
        link_id: Uuid,
        provider_email: &str,
        profile_json: &serde_json::Value,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        if let Some(link) = inner.links.iter_mut().find(|l| l.link_id == link_id) {
            link.provider_email = provider_email.to_string();
            link.profile_json = profile_json.clone();
            link.updated_utc = now;
        }
        Ok(())
    }

    async fn delete_oauth_link(
        &self,
        identity_id: Uuid,
        provider_code: &str,
    ) -> Result<bool, StoreError> {
        let mut inner = self.inner.lock().await;
        let before = inner.links.len();
        inner
            .links
            .retain(|l| !(l.identity_id == identity_id && l.provider_code == provider_code));
        Ok(inner.links.len() < before)
    }

    // ==================== Ephemeral tokens ====================

    async fn replace_ephemeral_token(&self, token: &EphemeralToken) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        inner.tokens.retain(|t| {
            !(t.subject_key == token.subject_key && t.purpose_code == token.purpose_code)
        });
        inner.tokens.push(token.clone());
        Ok(())
    }

    async fn find_ephemeral_token(
        &self,
        subject_key: &str,
        purpose_code: &str,
    ) -> Result<Option<EphemeralToken>, StoreError> {
        let inner = self.inner.lock().await;
        Ok(inner
            .tokens
            .iter()
            .find(|t| t.subject_key == subject_key && t.purpose_code == purpose_code)
            .cloned())
    }

    async fn delete_ephemeral_token(
        &self,
        subject_key: &str,
        purpose_code: &str,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        inner
            .tokens
            .retain(|t| !(t.subject_key == subject_key && t.purpose_code == purpose_code));
        Ok(())
    }

    async fn take_ephemeral_token(
        &self,
        subject_key: &str,
        purpose_code: &str,
        token_hash: &str,
    ) -> Result<Option<EphemeralToken>, StoreError> {
        let mut inner = self.inner.lock().await;
        let position = inner.tokens.iter().position(|t| {
            t.subject_key == subject_key
                && t.purpose_code == purpose_code
                && t.token_hash == token_hash
        });
        Ok(position.map(|i| inner.tokens.remove(i)))
    }

    // ==================== Recovery codes ====================

    async fn replace_recovery_codes(
        &self,
        identity_id: Uuid,
        codes: &[RecoveryCode],
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        inner.recovery_codes.retain(|c| c.identity_id != identity_id);
        inner.recovery_codes.extend_from_slice(codes);
        Ok(())
    }

    async fn consume_recovery_code(
        &self,
        identity_id: Uuid,
        code_hash: &str,
    ) -> Result<bool, StoreError> {
        let mut inner = self.inner.lock().await;
        let position = inner
            .recovery_codes
            .iter()
            .position(|c| c.identity_id == identity_id && c.code_hash == code_hash);
        match position {
            Some(i) => {
                inner.recovery_codes.remove(i);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn count_recovery_codes(&self, identity_id: Uuid) -> Result<i64, StoreError> {
        let inner = self.inner.lock().await;
        Ok(inner
            .recovery_codes
            .iter()
            .filter(|c| c.identity_id == identity_id)
            .count() as i64)
    }

    async fn clear_recovery_codes(&self, identity_id: Uuid) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        inner.recovery_codes.retain(|c| c.identity_id != identity_id);
        Ok(())
    }
}
