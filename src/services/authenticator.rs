//! Credential authenticator.
//!
//! Top-level orchestrator for login, registration, password change and the
//! mail-driven reset/verification flows. Each login step short-circuits to a
//! terminal result; unknown email and wrong password are indistinguishable
//! from the outside.

use std::sync::Arc;
use uuid::Uuid;

use super::{
    EmailProvider, EphemeralTokens, LockoutGuard, PasswordPolicy, SecondFactorProof,
    SecurityAudit, ServiceError, SessionRegistry, TokenCheck, TwoFactorManager,
};
use crate::models::{
    Identity, RequestContext, SecurityEvent, SecurityEventType, Session, TokenPurpose,
};
use crate::store::{Store, StoreError};
use crate::utils::{hash_password, verify_password, Clock, Password, PasswordHashString};

/// Terminal outcome of a login attempt that did not reject.
pub enum LoginOutcome {
    Success {
        token: String,
        session: Session,
        identity: Identity,
    },
    /// Password accepted, second factor outstanding. The challenge token is
    /// short-lived and only usable for the two-factor verify operation.
    TwoFactorRequired {
        identity_id: Uuid,
        challenge_token: String,
    },
}

/// Completed two-factor login.
pub struct TwoFactorLogin {
    pub token: String,
    pub session: Session,
    pub identity: Identity,
    pub proof: SecondFactorProof,
}

#[derive(Clone)]
pub struct CredentialAuthenticator {
    store: Arc<dyn Store>,
    audit: SecurityAudit,
    lockout: LockoutGuard,
    policy: PasswordPolicy,
    two_factor: TwoFactorManager,
    sessions: SessionRegistry,
    tokens: EphemeralTokens,
    email: Arc<dyn EmailProvider>,
    clock: Arc<dyn Clock>,
    base_url: String,
}

impl CredentialAuthenticator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Arc<dyn Store>,
        audit: SecurityAudit,
        lockout: LockoutGuard,
        policy: PasswordPolicy,
        two_factor: TwoFactorManager,
        sessions: SessionRegistry,
        tokens: EphemeralTokens,
        email: Arc<dyn EmailProvider>,
        clock: Arc<dyn Clock>,
        base_url: String,
    ) -> Self {
        Self {
            store,
            audit,
            lockout,
            policy,
            two_factor,
            sessions,
            tokens,
            email,
            clock,
            base_url,
        }
    }

    /// Login with email and password.
    ///
    /// Sequence: resolve identity, lockout gate, password check, verified-
    /// email gate, second-factor gate, session issue. The unverified-email
    /// gate deliberately does not feed the lockout counter.
    pub async fn login(
        &self,
        email: &str,
        password: &str,
        device_name: Option<String>,
        ctx: &RequestContext,
    ) -> Result<LoginOutcome, ServiceError> {
        let identity = match self.store.find_identity_by_email_any_tenant(email).await? {
            Some(identity) => identity,
            None => {
                // Unknown email: record the attempt without an identity and
                // answer exactly like a wrong password.
                self.audit
                    .record(SecurityEvent::new(
                        SecurityEventType::LoginFailed,
                        None,
                        None,
                        ctx,
                        Some(serde_json::json!({ "reason": "unknown_email" })),
                        self.clock.now(),
                    ))
                    .await;
                return Err(ServiceError::InvalidCredentials);
            }
        };

        if let Some(minutes_remaining) = self.lockout.check_locked(identity.identity_id).await? {
            return Err(ServiceError::AccountLocked { minutes_remaining });
        }

        if verify_password(
            &Password::new(password.to_string()),
            &PasswordHashString::new(identity.password_hash.clone()),
        )
        .is_err()
        {
            let locked_minutes = self.lockout.record_failure(&identity, ctx).await?;
            return Err(match locked_minutes {
                Some(minutes_remaining) => ServiceError::AccountLocked { minutes_remaining },
                None => ServiceError::InvalidCredentials,
            });
        }

        if !identity.is_email_verified() {
            return Err(ServiceError::EmailUnverified);
        }

        if identity.two_factor().is_enabled() {
            let challenge_token = self
                .tokens
                .issue(
                    &identity.identity_id.to_string(),
                    TokenPurpose::TwoFactorChallenge,
                )
                .await?;
            return Ok(LoginOutcome::TwoFactorRequired {
                identity_id: identity.identity_id,
                challenge_token,
            });
        }

        self.finish_login(identity, device_name, ctx, None).await
    }

    /// Complete a two-factor login with the challenge token from step one
    /// plus a TOTP or recovery code.
    ///
    /// A wrong code leaves the challenge intact for retry within its TTL;
    /// the challenge itself is burned on success.
    pub async fn verify_two_factor(
        &self,
        identity_id: Uuid,
        challenge_token: &str,
        code: &str,
        device_name: Option<String>,
        ctx: &RequestContext,
    ) -> Result<TwoFactorLogin, ServiceError> {
        let subject = identity_id.to_string();

        let check = self
            .tokens
            .validate(&subject, TokenPurpose::TwoFactorChallenge, challenge_token)
            .await?;
        EphemeralTokens::check_to_error(check)?;

        let identity = self
            .store
            .find_identity(identity_id)
            .await?
            .ok_or(ServiceError::TokenInvalid)?;

        let proof = self.two_factor.verify(&identity, code, ctx).await?;

        // Single-use: of two racing verifications only the one that takes
        // the challenge record completes the login.
        let consumed = self
            .tokens
            .consume(&subject, TokenPurpose::TwoFactorChallenge, challenge_token)
            .await?;
        if consumed != TokenCheck::Valid {
            return Err(ServiceError::TokenInvalid);
        }

        match self
            .finish_login(identity, device_name, ctx, Some(&proof))
            .await?
        {
            LoginOutcome::Success {
                token,
                session,
                identity,
            } => Ok(TwoFactorLogin {
                token,
                session,
                identity,
                proof,
            }),
            LoginOutcome::TwoFactorRequired { .. } => {
                Err(ServiceError::Internal(anyhow::anyhow!(
                    "Two-factor verification looped"
                )))
            }
        }
    }

    async fn finish_login(
        &self,
        identity: Identity,
        device_name: Option<String>,
        ctx: &RequestContext,
        proof: Option<&SecondFactorProof>,
    ) -> Result<LoginOutcome, ServiceError> {
        self.lockout.record_success(&identity).await?;

        let (token, session) = self
            .sessions
            .issue(&identity, device_name, None, ctx)
            .await?;

        let event_data = proof.map(|p| match p {
            SecondFactorProof::Totp => serde_json::json!({ "second_factor": "totp" }),
            SecondFactorProof::RecoveryCode { remaining } => {
                serde_json::json!({ "second_factor": "recovery_code", "remaining": remaining })
            }
        });

        self.audit
            .record(SecurityEvent::new(
                SecurityEventType::LoginSuccess,
                Some(identity.identity_id),
                Some(identity.tenant_id),
                ctx,
                event_data,
                self.clock.now(),
            ))
            .await;

        Ok(LoginOutcome::Success {
            token,
            session,
            identity,
        })
    }

    /// Register a new identity with an unverified email.
    ///
    /// The strength check hard-fails on any violation; the reuse check does
    /// not apply here, there is no prior history.
    pub async fn register(
        &self,
        tenant_id: Uuid,
        email: &str,
        password: &str,
        display_name: Option<String>,
        ctx: &RequestContext,
    ) -> Result<Identity, ServiceError> {
        PasswordPolicy::require_strength(password)?;

        if self
            .store
            .find_identity_by_email(tenant_id, email)
            .await?
            .is_some()
        {
            return Err(ServiceError::EmailTaken);
        }

        let password_hash = hash_password(&Password::new(password.to_string()))
            .map_err(ServiceError::Internal)?;

        let now = self.clock.now();
        let identity = Identity::new(
            tenant_id,
            email.to_string(),
            display_name,
            password_hash.as_str().to_string(),
            now,
        );

        match self.store.insert_identity(&identity).await {
            Ok(()) => {}
            Err(StoreError::UniqueViolation(_)) => return Err(ServiceError::EmailTaken),
            Err(e) => return Err(e.into()),
        }

        self.policy
            .record_history(identity.identity_id, &password_hash)
            .await?;

        self.audit
            .record(SecurityEvent::for_identity(
                SecurityEventType::UserRegistered,
                identity.identity_id,
                identity.tenant_id,
                ctx,
                now,
            ))
            .await;

        tracing::info!(identity_id = %identity.identity_id, "Identity registered");

        // Verification mail is best-effort at this point; the client can
        // re-request it from the send endpoint.
        if let Err(e) = self.send_verification_email(&identity).await {
            tracing::error!(
                error = %e,
                identity_id = %identity.identity_id,
                "Verification email not sent at registration"
            );
        }

        Ok(identity)
    }

    /// Change the password of an authenticated identity.
    ///
    /// Verifies the current password, applies the strength and reuse checks,
    /// then forces re-authentication everywhere except the calling session.
    pub async fn change_password(
        &self,
        identity: &Identity,
        current_password: &str,
        new_password: &str,
        current_token_hash: &str,
        ctx: &RequestContext,
    ) -> Result<(), ServiceError> {
        verify_password(
            &Password::new(current_password.to_string()),
            &PasswordHashString::new(identity.password_hash.clone()),
        )
        .map_err(|_| ServiceError::InvalidCredentials)?;

        PasswordPolicy::require_strength(new_password)?;

        let candidate = Password::new(new_password.to_string());
        if self.policy.is_reused(identity.identity_id, &candidate).await? {
            return Err(ServiceError::PasswordReused);
        }

        let new_hash = hash_password(&candidate).map_err(ServiceError::Internal)?;
        let now = self.clock.now();

        self.store
            .update_password(identity.identity_id, new_hash.as_str(), true, now)
            .await?;
        self.policy
            .record_history(identity.identity_id, &new_hash)
            .await?;

        self.audit
            .record(SecurityEvent::for_identity(
                SecurityEventType::PasswordChanged,
                identity.identity_id,
                identity.tenant_id,
                ctx,
                now,
            ))
            .await;

        let revoked = self
            .sessions
            .revoke_others(identity, current_token_hash, ctx)
            .await?;
        tracing::info!(
            identity_id = %identity.identity_id,
            revoked,
            "Password changed, other sessions revoked"
        );

        Ok(())
    }

    // ==================== Password reset ====================

    /// Request a reset token by email.
    ///
    /// Always succeeds with a generic outcome; whether the email exists is
    /// never revealed, and mail failures are swallowed for the same reason.
    pub async fn request_password_reset(
        &self,
        email: &str,
        _ctx: &RequestContext,
    ) -> Result<(), ServiceError> {
        let Some(identity) = self.store.find_identity_by_email_any_tenant(email).await? else {
            tracing::debug!("Password reset requested for unknown email");
            return Ok(());
        };

        let token = self
            .tokens
            .issue(&subject_for(&identity.email), TokenPurpose::PasswordReset)
            .await?;

        if let Err(e) = self
            .email
            .send_password_reset_email(&identity.email, &token, &self.base_url)
            .await
        {
            tracing::error!(
                error = %e,
                identity_id = %identity.identity_id,
                "Password reset email not sent"
            );
        } else {
            tracing::info!(identity_id = %identity.identity_id, "Password reset requested");
        }

        Ok(())
    }

    /// Read-only pre-check used before showing the reset form.
    pub async fn validate_password_reset(
        &self,
        email: &str,
        token: &str,
    ) -> Result<bool, ServiceError> {
        let check = self
            .tokens
            .validate(&subject_for(email), TokenPurpose::PasswordReset, token)
            .await?;
        Ok(check == TokenCheck::Valid)
    }

    /// Consume a reset token and rewrite the credential. Every session for
    /// the identity is revoked.
    pub async fn confirm_password_reset(
        &self,
        email: &str,
        token: &str,
        new_password: &str,
        ctx: &RequestContext,
    ) -> Result<(), ServiceError> {
        // Strength is checked before the token is consumed so a rejected
        // password does not burn the single-use token.
        PasswordPolicy::require_strength(new_password)?;

        let check = self
            .tokens
            .consume(&subject_for(email), TokenPurpose::PasswordReset, token)
            .await?;
        EphemeralTokens::check_to_error(check)?;

        let identity = self
            .store
            .find_identity_by_email_any_tenant(email)
            .await?
            .ok_or(ServiceError::TokenInvalid)?;

        let candidate = Password::new(new_password.to_string());
        if self.policy.is_reused(identity.identity_id, &candidate).await? {
            return Err(ServiceError::PasswordReused);
        }

        let new_hash = hash_password(&candidate).map_err(ServiceError::Internal)?;
        let now = self.clock.now();

        self.store
            .update_password(identity.identity_id, new_hash.as_str(), true, now)
            .await?;
        self.policy
            .record_history(identity.identity_id, &new_hash)
            .await?;
        self.sessions.revoke_all(&identity, ctx).await?;

        self.audit
            .record(SecurityEvent::for_identity(
                SecurityEventType::PasswordReset,
                identity.identity_id,
                identity.tenant_id,
                ctx,
                now,
            ))
            .await;

        Ok(())
    }

    // ==================== Email verification ====================

    /// Issue (or reissue) a verification token and send the mail.
    pub async fn send_verification_email(
        &self,
        identity: &Identity,
    ) -> Result<(), ServiceError> {
        if identity.is_email_verified() {
            return Ok(());
        }

        let token = self
            .tokens
            .issue(
                &subject_for(&identity.email),
                TokenPurpose::EmailVerification,
            )
            .await?;

        self.email
            .send_verification_email(&identity.email, &token, &self.base_url)
            .await
            .map_err(|e| ServiceError::Email(e.to_string()))
    }

    /// Consume a verification token and stamp the email as verified.
    pub async fn verify_email(
        &self,
        email: &str,
        token: &str,
        ctx: &RequestContext,
    ) -> Result<(), ServiceError> {
        let check = self
            .tokens
            .consume(&subject_for(email), TokenPurpose::EmailVerification, token)
            .await?;
        EphemeralTokens::check_to_error(check)?;

        let identity = self
            .store
            .find_identity_by_email_any_tenant(email)
            .await?
            .ok_or(ServiceError::TokenInvalid)?;

        let now = self.clock.now();
        self.store
            .mark_email_verified(identity.identity_id, now)
            .await?;

        self.audit
            .record(SecurityEvent::for_identity(
                SecurityEventType::EmailVerified,
                identity.identity_id,
                identity.tenant_id,
                ctx,
                now,
            ))
            .await;

        Ok(())
    }
}

/// Ephemeral-token subject key for mail-delivered purposes.
fn subject_for(email: &str) -> String {
    email.trim().to_lowercase()
}
