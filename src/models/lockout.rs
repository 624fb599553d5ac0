//! Lockout record - per-identity failed-attempt counter and lock state.
//!
//! The transition function is pure; both storage backends apply it inside a
//! per-identity serialized section so concurrent failures cannot under-count.

use chrono::{DateTime, Duration, Utc};
use sqlx::FromRow;
use uuid::Uuid;

/// Lockout state for one identity. Created lazily on the first recorded
/// attempt, never deleted.
#[derive(Debug, Clone, FromRow)]
pub struct LockoutRecord {
    pub identity_id: Uuid,
    pub failed_count: i32,
    pub locked_until_utc: Option<DateTime<Utc>>,
    pub last_attempt_utc: DateTime<Utc>,
}

impl LockoutRecord {
    pub fn fresh(identity_id: Uuid, now: DateTime<Utc>) -> Self {
        Self {
            identity_id,
            failed_count: 0,
            locked_until_utc: None,
            last_attempt_utc: now,
        }
    }

    /// A lock is effective only while `locked_until` lies in the future;
    /// expiry is evaluated lazily, there is no background sweep.
    pub fn is_locked(&self, now: DateTime<Utc>) -> bool {
        self.locked_until_utc.map_or(false, |until| until > now)
    }

    /// Minutes until the lock lifts, rounded up. None when not locked.
    pub fn remaining_minutes(&self, now: DateTime<Utc>) -> Option<i64> {
        let until = self.locked_until_utc?;
        if until <= now {
            return None;
        }
        let seconds = (until - now).num_seconds();
        Some((seconds + 59) / 60)
    }

    /// Apply one failed attempt. Returns the next state and whether this
    /// attempt crossed the threshold into the locked state.
    pub fn apply_failure(
        existing: Option<Self>,
        identity_id: Uuid,
        now: DateTime<Utc>,
        max_failed_attempts: u32,
        lock_duration: Duration,
    ) -> (Self, bool) {
        let mut record = match existing {
            // An expired lock behaves as if freshly unlocked.
            Some(r) if r.locked_until_utc.is_some() && !r.is_locked(now) => {
                Self::fresh(identity_id, now)
            }
            Some(r) => r,
            None => Self::fresh(identity_id, now),
        };

        let was_locked = record.is_locked(now);
        record.failed_count += 1;
        record.last_attempt_utc = now;

        if !was_locked && record.failed_count >= max_failed_attempts as i32 {
            record.locked_until_utc = Some(now + lock_duration);
            return (record, true);
        }

        (record, false)
    }

    /// Apply a successful authentication: counter back to zero, lock cleared.
    pub fn apply_success(identity_id: Uuid, now: DateTime<Utc>) -> Self {
        Self::fresh(identity_id, now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MAX: u32 = 5;

    fn lock_duration() -> Duration {
        Duration::minutes(15)
    }

    #[test]
    fn test_locks_on_fifth_failure() {
        let identity_id = Uuid::new_v4();
        let now = Utc::now();

        let mut record: Option<LockoutRecord> = None;
        for attempt in 1..=4 {
            let (next, locked) =
                LockoutRecord::apply_failure(record, identity_id, now, MAX, lock_duration());
            assert!(!locked, "attempt {} should not lock", attempt);
            assert_eq!(next.failed_count, attempt);
            record = Some(next);
        }

        let (next, locked) =
            LockoutRecord::apply_failure(record, identity_id, now, MAX, lock_duration());
        assert!(locked);
        assert!(next.is_locked(now));
        assert_eq!(next.locked_until_utc, Some(now + Duration::minutes(15)));
    }

    #[test]
    fn test_expired_lock_restarts_counting() {
        let identity_id = Uuid::new_v4();
        let now = Utc::now();

        let locked = LockoutRecord {
            identity_id,
            failed_count: 5,
            locked_until_utc: Some(now - Duration::seconds(1)),
            last_attempt_utc: now - Duration::minutes(16),
        };
        assert!(!locked.is_locked(now));

        let (next, relocked) =
            LockoutRecord::apply_failure(Some(locked), identity_id, now, MAX, lock_duration());
        assert!(!relocked);
        assert_eq!(next.failed_count, 1);
        assert!(next.locked_until_utc.is_none());
    }

    #[test]
    fn test_success_resets() {
        let identity_id = Uuid::new_v4();
        let now = Utc::now();
        let record = LockoutRecord::apply_success(identity_id, now);

        assert_eq!(record.failed_count, 0);
        assert!(record.locked_until_utc.is_none());
    }

    #[test]
    fn test_remaining_minutes_rounds_up() {
        let now = Utc::now();
        let record = LockoutRecord {
            identity_id: Uuid::new_v4(),
            failed_count: 5,
            locked_until_utc: Some(now + Duration::seconds(61)),
            last_attempt_utc: now,
        };

        assert_eq!(record.remaining_minutes(now), Some(2));
        assert_eq!(
            record.remaining_minutes(now + Duration::seconds(61)),
            None
        );
    }
}
