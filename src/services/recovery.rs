//! Recovery code vault.
//!
//! Fixed-size pools of high-entropy, human-typable one-time codes backing
//! the second factor. Codes are stored only as hashes of their normalized
//! form; consumption removes exactly one code atomically.

use rand::Rng;
use std::sync::Arc;
use uuid::Uuid;

use super::ServiceError;
use crate::models::{normalize_code, RecoveryCode, RECOVERY_POOL_SIZE};
use crate::store::Store;
use crate::utils::{hash_token, Clock};

/// Unambiguous alphabet: no 0/O, 1/I/L to survive being read over a phone.
const CODE_ALPHABET: &[u8] = b"ABCDEFGHJKMNPQRSTUVWXYZ23456789";
const CODE_HALF_LEN: usize = 5;

#[derive(Clone)]
pub struct RecoveryCodeVault {
    store: Arc<dyn Store>,
    clock: Arc<dyn Clock>,
}

impl RecoveryCodeVault {
    pub fn new(store: Arc<dyn Store>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    fn generate_code() -> String {
        let mut rng = rand::thread_rng();
        let mut half = |rng: &mut rand::rngs::ThreadRng| {
            (0..CODE_HALF_LEN)
                .map(|_| CODE_ALPHABET[rng.gen_range(0..CODE_ALPHABET.len())] as char)
                .collect::<String>()
        };
        format!("{}-{}", half(&mut rng), half(&mut rng))
    }

    /// Replace the identity's pool with a fresh one. The plaintext codes are
    /// returned exactly once and are never retrievable again.
    pub async fn generate(&self, identity_id: Uuid) -> Result<Vec<String>, ServiceError> {
        let now = self.clock.now();
        let plaintext: Vec<String> = (0..RECOVERY_POOL_SIZE)
            .map(|_| Self::generate_code())
            .collect();

        let rows: Vec<RecoveryCode> = plaintext
            .iter()
            .map(|code| RecoveryCode::new(identity_id, hash_token(&normalize_code(code)), now))
            .collect();

        self.store.replace_recovery_codes(identity_id, &rows).await?;
        Ok(plaintext)
    }

    /// Case-insensitive single-use consumption. On a match the code is
    /// removed from the pool atomically and the remaining count is returned;
    /// non-matching input leaves the pool untouched.
    pub async fn consume(
        &self,
        identity_id: Uuid,
        candidate: &str,
    ) -> Result<Option<i64>, ServiceError> {
        let code_hash = hash_token(&normalize_code(candidate));
        if self
            .store
            .consume_recovery_code(identity_id, &code_hash)
            .await?
        {
            let remaining = self.store.count_recovery_codes(identity_id).await?;
            Ok(Some(remaining))
        } else {
            Ok(None)
        }
    }

    pub async fn remaining(&self, identity_id: Uuid) -> Result<i64, ServiceError> {
        Ok(self.store.count_recovery_codes(identity_id).await?)
    }

    /// Drop every code for the identity (used when the factor is disabled).
    pub async fn clear(&self, identity_id: Uuid) -> Result<(), ServiceError> {
        self.store.clear_recovery_codes(identity_id).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_codes_are_typable() {
        for _ in 0..20 {
            let code = RecoveryCodeVault::generate_code();
            assert_eq!(code.len(), CODE_HALF_LEN * 2 + 1);
            assert_eq!(code.as_bytes()[CODE_HALF_LEN], b'-');
            for c in code.chars().filter(|c| *c != '-') {
                assert!(CODE_ALPHABET.contains(&(c as u8)), "unexpected char {}", c);
            }
        }
    }

    #[test]
    fn test_codes_are_distinct() {
        let a = RecoveryCodeVault::generate_code();
        let b = RecoveryCodeVault::generate_code();
        assert_ne!(a, b);
    }
}
