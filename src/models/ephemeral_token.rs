//! Ephemeral token model - single-use, time-bounded tokens.
//!
//! One primitive backs password reset, email verification and the login-time
//! two-factor challenge. At most one live token exists per (subject, purpose);
//! issuing a new one overwrites the prior record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Token purpose codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenPurpose {
    PasswordReset,
    EmailVerification,
    TwoFactorChallenge,
}

impl TokenPurpose {
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenPurpose::PasswordReset => "password_reset",
            TokenPurpose::EmailVerification => "email_verification",
            TokenPurpose::TwoFactorChallenge => "two_factor_challenge",
        }
    }
}

/// Ephemeral token entity. The plaintext value is never stored.
#[derive(Debug, Clone, FromRow)]
pub struct EphemeralToken {
    pub token_id: Uuid,
    /// Email for the mail-delivered purposes, identity id for the challenge.
    pub subject_key: String,
    pub purpose_code: String,
    pub token_hash: String,
    pub expiry_utc: DateTime<Utc>,
    pub created_utc: DateTime<Utc>,
}

impl EphemeralToken {
    pub fn new(
        subject_key: String,
        purpose: TokenPurpose,
        token_hash: String,
        expiry_utc: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            token_id: Uuid::new_v4(),
            subject_key,
            purpose_code: purpose.as_str().to_string(),
            token_hash,
            expiry_utc,
            created_utc: now,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expiry_utc <= now
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_expiry_boundary() {
        let now = Utc::now();
        let token = EphemeralToken::new(
            "a@b.test".to_string(),
            TokenPurpose::PasswordReset,
            "hash".to_string(),
            now + Duration::hours(1),
            now,
        );

        assert!(!token.is_expired(now));
        assert!(token.is_expired(now + Duration::hours(1)));
    }
}
