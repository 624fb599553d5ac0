//! Password policy engine.
//!
//! Strength validation reports every violation rather than stopping at the
//! first one; the reuse check compares a candidate against the stored history
//! hashes with the same scheme used for live credentials.

use serde::Serialize;
use std::sync::Arc;

use super::ServiceError;
use crate::models::{PasswordHistoryEntry, PASSWORD_HISTORY_DEPTH};
use crate::utils::{verify_password, Clock, Password, PasswordHashString};
use crate::store::Store;

/// Minimum password length.
pub const MIN_PASSWORD_LENGTH: usize = 8;

/// Passwords rejected outright, matched case-insensitively.
const COMMON_PASSWORDS: &[&str] = &[
    "password",
    "password1",
    "password123",
    "passw0rd",
    "123456",
    "1234567",
    "12345678",
    "123456789",
    "1234567890",
    "qwerty",
    "qwerty123",
    "abc123",
    "letmein",
    "welcome",
    "welcome1",
    "monkey",
    "dragon",
    "master",
    "iloveyou",
    "sunshine",
    "princess",
    "football",
    "baseball",
    "superman",
    "batman",
    "trustno1",
    "admin",
    "administrator",
    "login",
    "starwars",
    "whatever",
    "freedom",
    "shadow",
    "michael",
    "jennifer",
    "computer",
    "secret",
    "summer",
    "hello123",
    "changeme",
];

/// A single failed policy check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum PolicyViolation {
    TooShort { min_length: usize, actual_length: usize },
    MissingLowercase,
    MissingUppercase,
    MissingDigit,
    MissingSymbol,
    CommonPassword,
}

impl PolicyViolation {
    pub fn code(&self) -> &'static str {
        match self {
            PolicyViolation::TooShort { .. } => "too_short",
            PolicyViolation::MissingLowercase => "missing_lowercase",
            PolicyViolation::MissingUppercase => "missing_uppercase",
            PolicyViolation::MissingDigit => "missing_digit",
            PolicyViolation::MissingSymbol => "missing_symbol",
            PolicyViolation::CommonPassword => "common_password",
        }
    }
}

impl std::fmt::Display for PolicyViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PolicyViolation::TooShort {
                min_length,
                actual_length,
            } => write!(
                f,
                "Password must be at least {} characters (got {})",
                min_length, actual_length
            ),
            PolicyViolation::MissingLowercase => {
                write!(f, "Password must contain at least one lowercase letter")
            }
            PolicyViolation::MissingUppercase => {
                write!(f, "Password must contain at least one uppercase letter")
            }
            PolicyViolation::MissingDigit => {
                write!(f, "Password must contain at least one number")
            }
            PolicyViolation::MissingSymbol => {
                write!(f, "Password must contain at least one special character")
            }
            PolicyViolation::CommonPassword => {
                write!(f, "Password is too common")
            }
        }
    }
}

fn is_symbol(c: char) -> bool {
    matches!(
        c,
        '!' | '@'
            | '#'
            | '$'
            | '%'
            | '^'
            | '&'
            | '*'
            | '('
            | ')'
            | '-'
            | '_'
            | '='
            | '+'
            | '['
            | ']'
            | '{'
            | '}'
            | '|'
            | '\\'
            | ';'
            | ':'
            | '\''
            | '"'
            | ','
            | '.'
            | '<'
            | '>'
            | '/'
            | '?'
            | '`'
            | '~'
    )
}

/// Password policy engine.
#[derive(Clone)]
pub struct PasswordPolicy {
    store: Arc<dyn Store>,
    clock: Arc<dyn Clock>,
}

impl PasswordPolicy {
    pub fn new(store: Arc<dyn Store>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Evaluate every strength check; an empty list means acceptable.
    pub fn validate_strength(password: &str) -> Vec<PolicyViolation> {
        let mut violations = Vec::new();

        let length = password.chars().count();
        if length < MIN_PASSWORD_LENGTH {
            violations.push(PolicyViolation::TooShort {
                min_length: MIN_PASSWORD_LENGTH,
                actual_length: length,
            });
        }

        if !password.chars().any(|c| c.is_ascii_lowercase()) {
            violations.push(PolicyViolation::MissingLowercase);
        }

        if !password.chars().any(|c| c.is_ascii_uppercase()) {
            violations.push(PolicyViolation::MissingUppercase);
        }

        if !password.chars().any(|c| c.is_ascii_digit()) {
            violations.push(PolicyViolation::MissingDigit);
        }

        if !password.chars().any(is_symbol) {
            violations.push(PolicyViolation::MissingSymbol);
        }

        let lowered = password.to_lowercase();
        if COMMON_PASSWORDS.iter().any(|p| *p == lowered) {
            violations.push(PolicyViolation::CommonPassword);
        }

        violations
    }

    /// Strength check as a hard failure.
    pub fn require_strength(password: &str) -> Result<(), ServiceError> {
        let violations = Self::validate_strength(password);
        if violations.is_empty() {
            Ok(())
        } else {
            Err(ServiceError::PasswordPolicyViolation { violations })
        }
    }

    /// True when the candidate matches any of the retained history hashes.
    pub async fn is_reused(
        &self,
        identity_id: uuid::Uuid,
        candidate: &Password,
    ) -> Result<bool, ServiceError> {
        let entries = self
            .store
            .list_password_history(identity_id, PASSWORD_HISTORY_DEPTH as u32)
            .await?;

        for entry in entries {
            let hash = PasswordHashString::new(entry.password_hash);
            if verify_password(candidate, &hash).is_ok() {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Append a hash to the history, pruning to the retained depth.
    pub async fn record_history(
        &self,
        identity_id: uuid::Uuid,
        password_hash: &PasswordHashString,
    ) -> Result<(), ServiceError> {
        let entry = PasswordHistoryEntry::new(
            identity_id,
            password_hash.as_str().to_string(),
            self.clock.now(),
        );
        self.store
            .push_password_history(&entry, PASSWORD_HISTORY_DEPTH as u32)
            .await?;
        Ok(())
    }
}
