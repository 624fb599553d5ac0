//! Recovery code model - one-time backup codes for the second factor.
//!
//! One row per unused code, stored only as a hash of the normalized value.
//! Consumption deletes the row, so single use holds by construction.

use chrono::{DateTime, Utc};
use sqlx::FromRow;
use uuid::Uuid;

/// Codes per generated pool.
pub const RECOVERY_POOL_SIZE: usize = 8;

/// Recovery code entity.
#[derive(Debug, Clone, FromRow)]
pub struct RecoveryCode {
    pub code_id: Uuid,
    pub identity_id: Uuid,
    /// SHA-256 of the uppercase-normalized code.
    pub code_hash: String,
    pub created_utc: DateTime<Utc>,
}

impl RecoveryCode {
    pub fn new(identity_id: Uuid, code_hash: String, now: DateTime<Utc>) -> Self {
        Self {
            code_id: Uuid::new_v4(),
            identity_id,
            code_hash,
            created_utc: now,
        }
    }
}

/// Matching is case-insensitive; hyphens the user may or may not retype are
/// ignored as well.
pub fn normalize_code(candidate: &str) -> String {
    candidate
        .trim()
        .chars()
        .filter(|c| *c != '-')
        .collect::<String>()
        .to_ascii_uppercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_is_case_and_hyphen_insensitive() {
        assert_eq!(normalize_code("ab2cd-ef3gh"), "AB2CDEF3GH");
        assert_eq!(normalize_code(" AB2CDEF3GH "), "AB2CDEF3GH");
        assert_eq!(normalize_code("ab2cdef3gh"), normalize_code("AB2CD-EF3GH"));
    }
}
