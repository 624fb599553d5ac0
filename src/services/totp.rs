//! TOTP second-factor manager.
//!
//! Per-identity state machine: Disabled -> PendingConfirmation -> Enabled ->
//! (disable) -> Disabled. The shared secret is encrypted at rest and never
//! returned after provisioning; confirmation demands the current time step
//! exactly, login-time verification tolerates +/-2 steps of clock drift.

use std::sync::Arc;
use totp_rs::{Algorithm, Secret, TOTP};

use super::{RecoveryCodeVault, SecurityAudit, ServiceError};
use crate::models::{Identity, RequestContext, SecurityEvent, SecurityEventType, TwoFactor};
use crate::store::Store;
use crate::utils::{verify_password, Clock, Password, PasswordHashString, SecretCipher};

const TOTP_DIGITS: usize = 6;
const TOTP_STEP_SECONDS: u64 = 30;
/// Confirmation accepts the current step only.
const CONFIRM_SKEW: u8 = 0;
/// Login-time verification absorbs +/-2 steps (+/-60 s) of drift.
const VERIFY_SKEW: u8 = 2;

/// Returned by `enable` exactly once; none of it is retrievable again.
pub struct TwoFactorEnrollment {
    pub secret_base32: String,
    pub provisioning_uri: String,
    pub recovery_codes: Vec<String>,
}

/// How a login-time second factor was satisfied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecondFactorProof {
    Totp,
    /// A one-time recovery code was burned; the pool is shrinking and the
    /// caller should prompt for reprovisioning.
    RecoveryCode { remaining: i64 },
}

impl SecondFactorProof {
    pub fn needs_reprovision(&self) -> bool {
        matches!(self, SecondFactorProof::RecoveryCode { .. })
    }
}

#[derive(Clone)]
pub struct TwoFactorManager {
    store: Arc<dyn Store>,
    vault: RecoveryCodeVault,
    audit: SecurityAudit,
    clock: Arc<dyn Clock>,
    cipher: SecretCipher,
    issuer: String,
}

impl TwoFactorManager {
    pub fn new(
        store: Arc<dyn Store>,
        vault: RecoveryCodeVault,
        audit: SecurityAudit,
        clock: Arc<dyn Clock>,
        cipher: SecretCipher,
        issuer: String,
    ) -> Self {
        Self {
            store,
            vault,
            audit,
            clock,
            cipher,
            issuer,
        }
    }

    fn totp(&self, secret: Vec<u8>, account: &str, skew: u8) -> Result<TOTP, ServiceError> {
        TOTP::new(
            Algorithm::SHA1,
            TOTP_DIGITS,
            skew,
            TOTP_STEP_SECONDS,
            secret,
            Some(self.issuer.clone()),
            account.to_string(),
        )
        .map_err(|e| ServiceError::Internal(anyhow::anyhow!("TOTP construction failed: {}", e)))
    }

    fn decrypt_secret(&self, identity: &Identity, secret_enc: &[u8]) -> Result<Vec<u8>, ServiceError> {
        self.cipher
            .decrypt(secret_enc, identity.identity_id)
            .map_err(ServiceError::Internal)
    }

    /// Provision a new secret and recovery-code pool.
    ///
    /// Only valid from Disabled. The secret, provisioning URI and plaintext
    /// recovery codes are handed back to the caller exactly once.
    pub async fn enable(&self, identity: &Identity) -> Result<TwoFactorEnrollment, ServiceError> {
        match identity.two_factor() {
            TwoFactor::Disabled => {}
            TwoFactor::Pending { .. } | TwoFactor::Enabled { .. } => {
                return Err(ServiceError::AlreadyEnabled)
            }
        }

        let secret = Secret::generate_secret();
        let secret_bytes = secret
            .to_bytes()
            .map_err(|e| ServiceError::Internal(anyhow::anyhow!("Secret generation failed: {}", e)))?;

        let totp = self.totp(secret_bytes.clone(), &identity.email, CONFIRM_SKEW)?;
        let provisioning_uri = totp.get_url();
        let secret_base32 = totp.get_secret_base32();

        let recovery_codes = self.vault.generate(identity.identity_id).await?;

        let secret_enc = self
            .cipher
            .encrypt(&secret_bytes, identity.identity_id)
            .map_err(ServiceError::Internal)?;

        self.store
            .update_two_factor(
                identity.identity_id,
                "pending",
                Some(&secret_enc),
                None,
                self.clock.now(),
            )
            .await?;

        tracing::info!(identity_id = %identity.identity_id, "Two-factor enrollment started");

        Ok(TwoFactorEnrollment {
            secret_base32,
            provisioning_uri,
            recovery_codes,
        })
    }

    /// Confirm possession of the provisioned secret.
    ///
    /// Only valid from PendingConfirmation; the code must match the current
    /// 30-second step with zero tolerance. A failure leaves the state
    /// unchanged and does not feed the lockout counter.
    pub async fn confirm(
        &self,
        identity: &Identity,
        code: &str,
        ctx: &RequestContext,
    ) -> Result<(), ServiceError> {
        let secret_enc = match identity.two_factor() {
            TwoFactor::Pending { secret_enc } => secret_enc,
            TwoFactor::Enabled { .. } => return Err(ServiceError::AlreadyEnabled),
            TwoFactor::Disabled => return Err(ServiceError::NotEnabled),
        };

        let secret = self.decrypt_secret(identity, &secret_enc)?;
        let totp = self.totp(secret, &identity.email, CONFIRM_SKEW)?;

        let now = self.clock.now();
        if !totp.check(code, now.timestamp() as u64) {
            return Err(ServiceError::InvalidTwoFactorCode);
        }

        self.store
            .update_two_factor(
                identity.identity_id,
                "enabled",
                Some(&secret_enc),
                Some(now),
                now,
            )
            .await?;

        self.audit
            .record(SecurityEvent::for_identity(
                SecurityEventType::TwoFactorEnabled,
                identity.identity_id,
                identity.tenant_id,
                ctx,
                now,
            ))
            .await;

        Ok(())
    }

    /// Login-time verification: recovery code first, then TOTP within the
    /// drift window. Only valid from Enabled.
    pub async fn verify(
        &self,
        identity: &Identity,
        code: &str,
        ctx: &RequestContext,
    ) -> Result<SecondFactorProof, ServiceError> {
        let secret_enc = match identity.two_factor() {
            TwoFactor::Enabled { secret_enc } => secret_enc,
            _ => return Err(ServiceError::NotEnabled),
        };

        if let Some(remaining) = self.vault.consume(identity.identity_id, code).await? {
            let now = self.clock.now();
            self.audit
                .record(SecurityEvent::new(
                    SecurityEventType::RecoveryCodeUsed,
                    Some(identity.identity_id),
                    Some(identity.tenant_id),
                    ctx,
                    Some(serde_json::json!({ "remaining": remaining })),
                    now,
                ))
                .await;
            return Ok(SecondFactorProof::RecoveryCode { remaining });
        }

        let secret = self.decrypt_secret(identity, &secret_enc)?;
        let totp = self.totp(secret, &identity.email, VERIFY_SKEW)?;

        if totp.check(code, self.clock.now().timestamp() as u64) {
            Ok(SecondFactorProof::Totp)
        } else {
            Err(ServiceError::InvalidTwoFactorCode)
        }
    }

    /// Wipe the secret and recovery codes after a fresh password check.
    pub async fn disable(
        &self,
        identity: &Identity,
        password: &str,
        ctx: &RequestContext,
    ) -> Result<(), ServiceError> {
        match identity.two_factor() {
            TwoFactor::Disabled => return Err(ServiceError::NotEnabled),
            TwoFactor::Pending { .. } | TwoFactor::Enabled { .. } => {}
        }

        verify_password(
            &Password::new(password.to_string()),
            &PasswordHashString::new(identity.password_hash.clone()),
        )
        .map_err(|_| ServiceError::InvalidCredentials)?;

        let now = self.clock.now();
        self.store
            .update_two_factor(identity.identity_id, "disabled", None, None, now)
            .await?;
        self.vault.clear(identity.identity_id).await?;

        self.audit
            .record(SecurityEvent::for_identity(
                SecurityEventType::TwoFactorDisabled,
                identity.identity_id,
                identity.tenant_id,
                ctx,
                now,
            ))
            .await;

        Ok(())
    }

    /// Replace the recovery-code pool, invalidating all previously issued
    /// codes. Requires a fresh password check like `disable`.
    pub async fn regenerate_recovery_codes(
        &self,
        identity: &Identity,
        password: &str,
        ctx: &RequestContext,
    ) -> Result<Vec<String>, ServiceError> {
        if !identity.two_factor().is_enabled() {
            return Err(ServiceError::NotEnabled);
        }

        verify_password(
            &Password::new(password.to_string()),
            &PasswordHashString::new(identity.password_hash.clone()),
        )
        .map_err(|_| ServiceError::InvalidCredentials)?;

        let codes = self.vault.generate(identity.identity_id).await?;

        self.audit
            .record(SecurityEvent::for_identity(
                SecurityEventType::RecoveryCodesRegenerated,
                identity.identity_id,
                identity.tenant_id,
                ctx,
                self.clock.now(),
            ))
            .await;

        Ok(codes)
    }
}
