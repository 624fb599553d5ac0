//! PostgreSQL store.
//!
//! Row locks serialize the lockout read-modify-write; token and recovery-code
//! consumption are single conditional deletes, so the single-use invariants
//! hold under concurrent requests.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use sqlx::postgres::PgPool;
use uuid::Uuid;

use super::{Store, StoreError};
use crate::models::{
    EphemeralToken, Identity, LockoutRecord, OAuthLink, PasswordHistoryEntry, RecoveryCode,
    SecurityEvent, Session, Tenant,
};

/// PostgreSQL store wrapper.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(
        err,
        sqlx::Error::Database(db) if matches!(db.kind(), sqlx::error::ErrorKind::UniqueViolation)
    )
}

fn map_unique(err: sqlx::Error, key: &'static str) -> StoreError {
    if is_unique_violation(&err) {
        StoreError::UniqueViolation(key)
    } else {
        StoreError::from(err)
    }
}

#[async_trait]
impl Store for PgStore {
    // ==================== Tenants ====================

    async fn find_tenant_by_label(&self, label: &str) -> Result<Option<Tenant>, StoreError> {
        Ok(
            sqlx::query_as::<_, Tenant>("SELECT * FROM tenants WHERE tenant_label = $1")
                .bind(label)
                .fetch_optional(&self.pool)
                .await?,
        )
    }

    async fn insert_tenant(&self, tenant: &Tenant) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO tenants (tenant_id, tenant_label, created_utc) VALUES ($1, $2, $3)",
        )
        .bind(tenant.tenant_id)
        .bind(&tenant.tenant_label)
        .bind(tenant.created_utc)
        .execute(&self.pool)
        .await
        .map_err(|e| map_unique(e, "tenants_label"))?;
        Ok(())
    }

    // ==================== Identities ====================

    async fn find_identity(&self, identity_id: Uuid) -> Result<Option<Identity>, StoreError> {
        Ok(
            sqlx::query_as::<_, Identity>("SELECT * FROM identities WHERE identity_id = $1")
                .bind(identity_id)
                .fetch_optional(&self.pool)
                .await?,
        )
    }

    async fn find_identity_by_email(
        &self,
        tenant_id: Uuid,
        email: &str,
    ) -> Result<Option<Identity>, StoreError> {
        Ok(sqlx::query_as::<_, Identity>(
            "SELECT * FROM identities WHERE tenant_id = $1 AND LOWER(email) = LOWER($2)",
        )
        .bind(tenant_id)
        .bind(email)
        .fetch_optional(&self.pool)
        .await?)
    }

    async fn find_identity_by_email_any_tenant(
        &self,
        email: &str,
    ) -> Result<Option<Identity>, StoreError> {
        Ok(sqlx::query_as::<_, Identity>(
            "SELECT * FROM identities WHERE LOWER(email) = LOWER($1) ORDER BY created_utc LIMIT 1",
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?)
    }

    async fn insert_identity(&self, identity: &Identity) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO identities (
                identity_id, tenant_id, email, display_name, password_hash, password_set,
                email_verified_utc, totp_state_code, totp_secret_enc, totp_confirmed_utc,
                created_utc, updated_utc
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            "#,
        )
        .bind(identity.identity_id)
        .bind(identity.tenant_id)
        .bind(&identity.email)
        .bind(&identity.display_name)
        .bind(&identity.password_hash)
        .bind(identity.password_set)
        .bind(identity.email_verified_utc)
        .bind(&identity.totp_state_code)
        .bind(&identity.totp_secret_enc)
        .bind(identity.totp_confirmed_utc)
        .bind(identity.created_utc)
        .bind(identity.updated_utc)
        .execute(&self.pool)
        .await
        .map_err(|e| map_unique(e, "identities_tenant_email"))?;
        Ok(())
    }

    async fn update_password(
        &self,
        identity_id: Uuid,
        password_hash: &str,
        password_set: bool,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "UPDATE identities SET password_hash = $2, password_set = $3, updated_utc = $4 \
             WHERE identity_id = $1",
        )
        .bind(identity_id)
        .bind(password_hash)
        .bind(password_set)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn mark_email_verified(
        &self,
        identity_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "UPDATE identities SET email_verified_utc = $2, updated_utc = $2 \
             WHERE identity_id = $1 AND email_verified_utc IS NULL",
        )
        .bind(identity_id)
        .bind(now)
        .execute(&self.pool)
        .await?;
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
        sqlx::query(
            "UPDATE identities SET totp_state_code = $2, totp_secret_enc = $3, \
             totp_confirmed_utc = $4, updated_utc = $5 WHERE identity_id = $1",
        )
        .bind(identity_id)
        .bind(state_code)
        .bind(secret_enc)
        .bind(confirmed_utc)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    // ==================== Lockout ====================

    async fn get_lockout(
        &self,
        identity_id: Uuid,
    ) -> Result<Option<LockoutRecord>, StoreError> {
        Ok(sqlx::query_as::<_, LockoutRecord>(
            "SELECT * FROM lockout_records WHERE identity_id = $1",
        )
        .bind(identity_id)
        .fetch_optional(&self.pool)
        .await?)
    }

    async fn record_lockout_failure(
        &self,
        identity_id: Uuid,
        now: DateTime<Utc>,
        max_failed_attempts: u32,
        lock_duration: Duration,
    ) -> Result<(LockoutRecord, bool), StoreError> {
        let mut tx = self.pool.begin().await?;

        let existing = sqlx::query_as::<_, LockoutRecord>(
            "SELECT * FROM lockout_records WHERE identity_id = $1 FOR UPDATE",
        )
        .bind(identity_id)
        .fetch_optional(&mut *tx)
        .await?;

        let (record, became_locked) = LockoutRecord::apply_failure(
            existing,
            identity_id,
            now,
            max_failed_attempts,
            lock_duration,
        );

        sqlx::query(
            r#"
            INSERT INTO lockout_records (identity_id, failed_count, locked_until_utc, last_attempt_utc)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (identity_id) DO UPDATE SET
                failed_count = EXCLUDED.failed_count,
                locked_until_utc = EXCLUDED.locked_until_utc,
                last_attempt_utc = EXCLUDED.last_attempt_utc
            "#,
        )
        .bind(record.identity_id)
        .bind(record.failed_count)
        .bind(record.locked_until_utc)
        .bind(record.last_attempt_utc)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok((record, became_locked))
    }

    async fn reset_lockout(
        &self,
        identity_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO lockout_records (identity_id, failed_count, locked_until_utc, last_attempt_utc)
            VALUES ($1, 0, NULL, $2)
            ON CONFLICT (identity_id) DO UPDATE SET
                failed_count = 0,
                locked_until_utc = NULL,
                last_attempt_utc = EXCLUDED.last_attempt_utc
            "#,
        )
        .bind(identity_id)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    // ==================== Password history ====================

    async fn list_password_history(
        &self,
        identity_id: Uuid,
        limit: u32,
    ) -> Result<Vec<PasswordHistoryEntry>, StoreError> {
        Ok(sqlx::query_as::<_, PasswordHistoryEntry>(
            "SELECT * FROM password_history WHERE identity_id = $1 ORDER BY seq DESC LIMIT $2",
        )
        .bind(identity_id)
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?)
    }

    async fn push_password_history(
        &self,
        entry: &PasswordHistoryEntry,
        keep: u32,
    ) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "INSERT INTO password_history (history_id, identity_id, password_hash, created_utc) \
             VALUES ($1, $2, $3, $4)",
        )
        .bind(entry.history_id)
        .bind(entry.identity_id)
        .bind(&entry.password_hash)
        .bind(entry.created_utc)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            DELETE FROM password_history
            WHERE identity_id = $1
              AND history_id NOT IN (
                  SELECT history_id FROM password_history
                  WHERE identity_id = $1
                  ORDER BY seq DESC
                  LIMIT $2
              )
            "#,
        )
        .bind(entry.identity_id)
        .bind(i64::from(keep))
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    // ==================== Security events ====================

    async fn append_security_event(&self, event: &SecurityEvent) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO security_events (
                event_id, identity_id, tenant_id, event_type_code, ip_address,
                user_agent, event_data, created_utc
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(event.event_id)
        .bind(event.identity_id)
        .bind(event.tenant_id)
        .bind(&event.event_type_code)
        .bind(&event.ip_address)
        .bind(&event.user_agent)
        .bind(&event.event_data)
        .bind(event.created_utc)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_security_events(
        &self,
        identity_id: Uuid,
        limit: u32,
    ) -> Result<Vec<SecurityEvent>, StoreError> {
        Ok(sqlx::query_as::<_, SecurityEvent>(
            "SELECT * FROM security_events WHERE identity_id = $1 \
             ORDER BY created_utc DESC LIMIT $2",
        )
        .bind(identity_id)
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?)
    }

    // ==================== Sessions ====================

    async fn insert_session(&self, session: &Session) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO sessions (
                session_id, identity_id, tenant_id, token_hash, device_name, device_type,
                ip_address, user_agent, last_activity_utc, expiry_utc, created_utc
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(session.session_id)
        .bind(session.identity_id)
        .bind(session.tenant_id)
        .bind(&session.token_hash)
        .bind(&session.device_name)
        .bind(&session.device_type)
        .bind(&session.ip_address)
        .bind(&session.user_agent)
        .bind(session.last_activity_utc)
        .bind(session.expiry_utc)
        .bind(session.created_utc)
        .execute(&self.pool)
        .await
        .map_err(|e| map_unique(e, "sessions_token_hash"))?;
        Ok(())
    }

    async fn find_session_by_token_hash(
        &self,
        token_hash: &str,
    ) -> Result<Option<Session>, StoreError> {
        Ok(
            sqlx::query_as::<_, Session>("SELECT * FROM sessions WHERE token_hash = $1")
                .bind(token_hash)
                .fetch_optional(&self.pool)
                .await?,
        )
    }

    async fn find_session(&self, session_id: Uuid) -> Result<Option<Session>, StoreError> {
        Ok(
            sqlx::query_as::<_, Session>("SELECT * FROM sessions WHERE session_id = $1")
                .bind(session_id)
                .fetch_optional(&self.pool)
                .await?,
        )
    }

    async fn list_active_sessions(
        &self,
        identity_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Vec<Session>, StoreError> {
        Ok(sqlx::query_as::<_, Session>(
            "SELECT * FROM sessions WHERE identity_id = $1 \
             AND (expiry_utc IS NULL OR expiry_utc > $2) \
             ORDER BY last_activity_utc DESC",
        )
        .bind(identity_id)
        .bind(now)
        .fetch_all(&self.pool)
        .await?)
    }

    async fn touch_session(
        &self,
        session_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        sqlx::query("UPDATE sessions SET last_activity_utc = $2 WHERE session_id = $1")
            .bind(session_id)
            .bind(now)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn expire_session(
        &self,
        session_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        sqlx::query("UPDATE sessions SET expiry_utc = $2 WHERE session_id = $1")
            .bind(session_id)
            .bind(now)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn expire_sessions_except(
        &self,
        identity_id: Uuid,
        keep_token_hash: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE sessions SET expiry_utc = $3
            WHERE identity_id = $1
              AND (expiry_utc IS NULL OR expiry_utc > $3)
              AND ($2::text IS NULL OR token_hash <> $2)
            "#,
        )
        .bind(identity_id)
        .bind(keep_token_hash)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    // ==================== OAuth links ====================

    async fn find_oauth_link(
        &self,
        provider_code: &str,
        provider_user_id: &str,
    ) -> Result<Option<OAuthLink>, StoreError> {
        Ok(sqlx::query_as::<_, OAuthLink>(
            "SELECT * FROM oauth_links WHERE provider_code = $1 AND provider_user_id = $2",
        )
        .bind(provider_code)
        .bind(provider_user_id)
        .fetch_optional(&self.pool)
        .await?)
    }

    async fn list_oauth_links(&self, identity_id: Uuid) -> Result<Vec<OAuthLink>, StoreError> {
        Ok(sqlx::query_as::<_, OAuthLink>(
            "SELECT * FROM oauth_links WHERE identity_id = $1 ORDER BY created_utc",
        )
        .bind(identity_id)
        .fetch_all(&self.pool)
        .await?)
    }

    async fn insert_oauth_link(&self, link: &OAuthLink) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO oauth_links (
                link_id, identity_id, tenant_id, provider_code, provider_user_id,
                provider_email, profile_json, created_utc, updated_utc
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(link.link_id)
        .bind(link.identity_id)
        .bind(link.tenant_id)
        .bind(&link.provider_code)
        .bind(&link.provider_user_id)
        .bind(&link.provider_email)
        .bind(&link.profile_json)
        .bind(link.created_utc)
        .bind(link.updated_utc)
        .execute(&self.pool)
        .await
        .map_err(|e| map_unique(e, "oauth_links_provider_user"))?;
        Ok(())
    }

    async fn refresh_oauth_link(
        &self,
        link_id: Uuid,
        provider_email: &str,
        profile_json: &serde_json::Value,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "UPDATE oauth_links SET provider_email = $2, profile_json = $3, updated_utc = $4 \
             WHERE link_id = $1",
        )
        .bind(link_id)
        .bind(provider_email)
        .bind(profile_json)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn delete_oauth_link(
        &self,
        identity_id: Uuid,
        provider_code: &str,
    ) -> Result<bool, StoreError> {
        let result =
            sqlx::query("DELETE FROM oauth_links WHERE identity_id = $1 AND provider_code = $2")
                .bind(identity_id)
                .bind(provider_code)
                .execute(&self.pool)
                .await?;
        Ok(result.rows_affected() > 0)
    }

    // ==================== Ephemeral tokens ====================

    async fn replace_ephemeral_token(&self, token: &EphemeralToken) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM ephemeral_tokens WHERE subject_key = $1 AND purpose_code = $2")
            .bind(&token.subject_key)
            .bind(&token.purpose_code)
            .execute(&mut *tx)
            .await?;

        sqlx::query(
            r#"
            INSERT INTO ephemeral_tokens (
                token_id, subject_key, purpose_code, token_hash, expiry_utc, created_utc
            )
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(token.token_id)
        .bind(&token.subject_key)
        .bind(&token.purpose_code)
        .bind(&token.token_hash)
        .bind(token.expiry_utc)
        .bind(token.created_utc)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn find_ephemeral_token(
        &self,
        subject_key: &str,
        purpose_code: &str,
    ) -> Result<Option<EphemeralToken>, StoreError> {
        Ok(sqlx::query_as::<_, EphemeralToken>(
            "SELECT * FROM ephemeral_tokens WHERE subject_key = $1 AND purpose_code = $2",
        )
        .bind(subject_key)
        .bind(purpose_code)
        .fetch_optional(&self.pool)
        .await?)
    }

    async fn delete_ephemeral_token(
        &self,
        subject_key: &str,
        purpose_code: &str,
    ) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM ephemeral_tokens WHERE subject_key = $1 AND purpose_code = $2")
            .bind(subject_key)
            .bind(purpose_code)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn take_ephemeral_token(
        &self,
        subject_key: &str,
        purpose_code: &str,
        token_hash: &str,
    ) -> Result<Option<EphemeralToken>, StoreError> {
        Ok(sqlx::query_as::<_, EphemeralToken>(
            "DELETE FROM ephemeral_tokens \
             WHERE subject_key = $1 AND purpose_code = $2 AND token_hash = $3 \
             RETURNING *",
        )
        .bind(subject_key)
        .bind(purpose_code)
        .bind(token_hash)
        .fetch_optional(&self.pool)
        .await?)
    }

    // ==================== Recovery codes ====================

    async fn replace_recovery_codes(
        &self,
        identity_id: Uuid,
        codes: &[RecoveryCode],
    ) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM recovery_codes WHERE identity_id = $1")
            .bind(identity_id)
            .execute(&mut *tx)
            .await?;

        for code in codes {
            sqlx::query(
                "INSERT INTO recovery_codes (code_id, identity_id, code_hash, created_utc) \
                 VALUES ($1, $2, $3, $4)",
            )
            .bind(code.code_id)
            .bind(code.identity_id)
            .bind(&code.code_hash)
            .bind(code.created_utc)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn consume_recovery_code(
        &self,
        identity_id: Uuid,
        code_hash: &str,
    ) -> Result<bool, StoreError> {
        let result =
            sqlx::query("DELETE FROM recovery_codes WHERE identity_id = $1 AND code_hash = $2")
                .bind(identity_id)
                .bind(code_hash)
                .execute(&self.pool)
                .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn count_recovery_codes(&self, identity_id: Uuid) -> Result<i64, StoreError> {
        let count: (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM recovery_codes WHERE identity_id = $1")
                .bind(identity_id)
                .fetch_one(&self.pool)
                .await?;
        Ok(count.0)
    }

    async fn clear_recovery_codes(&self, identity_id: Uuid) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM recovery_codes WHERE identity_id = $1")
            .bind(identity_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
