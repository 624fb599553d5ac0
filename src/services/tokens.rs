//! Ephemeral token issuer.
//!
//! Generic single-use, time-bounded token primitive behind password reset,
//! email verification and the login-time two-factor challenge. At most one
//! live token exists per (subject, purpose); consumption is an atomic
//! check-and-delete so a token can never be validated twice.

use chrono::Duration;
use std::sync::Arc;

use super::ServiceError;
use crate::models::{EphemeralToken, TokenPurpose};
use crate::store::Store;
use crate::utils::{generate_token, hash_token, hashes_match, Clock};

/// Result of checking a supplied token against the stored record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenCheck {
    Valid,
    Expired,
    /// A live record exists but the supplied value does not match; the
    /// record is left intact so the subject can retry until expiry.
    Mismatch,
    Missing,
}

fn ttl_for(purpose: TokenPurpose) -> Duration {
    match purpose {
        TokenPurpose::PasswordReset => Duration::hours(1),
        TokenPurpose::EmailVerification => Duration::hours(24),
        TokenPurpose::TwoFactorChallenge => Duration::minutes(5),
    }
}

#[derive(Clone)]
pub struct EphemeralTokens {
    store: Arc<dyn Store>,
    clock: Arc<dyn Clock>,
}

impl EphemeralTokens {
    pub fn new(store: Arc<dyn Store>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Issue a token for (subject, purpose), silently invalidating any
    /// outstanding one. Returns the plaintext exactly once; only the hash is
    /// stored.
    pub async fn issue(
        &self,
        subject_key: &str,
        purpose: TokenPurpose,
    ) -> Result<String, ServiceError> {
        let now = self.clock.now();
        let plaintext = generate_token();
        let record = EphemeralToken::new(
            subject_key.to_string(),
            purpose,
            hash_token(&plaintext),
            now + ttl_for(purpose),
            now,
        );
        self.store.replace_ephemeral_token(&record).await?;
        Ok(plaintext)
    }

    /// Destructive single-use check: deletes the record on success. Of two
    /// concurrent consumers of the same token, at most one observes Valid.
    pub async fn consume(
        &self,
        subject_key: &str,
        purpose: TokenPurpose,
        supplied: &str,
    ) -> Result<TokenCheck, ServiceError> {
        let now = self.clock.now();

        let taken = self
            .store
            .take_ephemeral_token(subject_key, purpose.as_str(), &hash_token(supplied))
            .await?;

        if let Some(record) = taken {
            if record.is_expired(now) {
                // Already deleted by the take; expiry still wins.
                return Ok(TokenCheck::Expired);
            }
            return Ok(TokenCheck::Valid);
        }

        // No hash match. Distinguish expired/mismatch/missing from the live
        // record without touching it, except to clear an expired one.
        match self
            .store
            .find_ephemeral_token(subject_key, purpose.as_str())
            .await?
        {
            Some(record) if record.is_expired(now) => {
                self.store
                    .delete_ephemeral_token(subject_key, purpose.as_str())
                    .await?;
                Ok(TokenCheck::Expired)
            }
            Some(_) => Ok(TokenCheck::Mismatch),
            None => Ok(TokenCheck::Missing),
        }
    }

    /// Read-only variant used to pre-check a token before showing a form;
    /// never deletes the record.
    pub async fn validate(
        &self,
        subject_key: &str,
        purpose: TokenPurpose,
        supplied: &str,
    ) -> Result<TokenCheck, ServiceError> {
        let now = self.clock.now();
        match self
            .store
            .find_ephemeral_token(subject_key, purpose.as_str())
            .await?
        {
            None => Ok(TokenCheck::Missing),
            Some(record) if record.is_expired(now) => Ok(TokenCheck::Expired),
            Some(record) => {
                if hashes_match(&record.token_hash, &hash_token(supplied)) {
                    Ok(TokenCheck::Valid)
                } else {
                    Ok(TokenCheck::Mismatch)
                }
            }
        }
    }

    /// Map a failed check to the error taxonomy.
    pub fn check_to_error(check: TokenCheck) -> Result<(), ServiceError> {
        match check {
            TokenCheck::Valid => Ok(()),
            TokenCheck::Expired => Err(ServiceError::TokenExpired),
            TokenCheck::Mismatch | TokenCheck::Missing => Err(ServiceError::TokenInvalid),
        }
    }
}
