//! Lockout guard properties: threshold, lazy expiry, counter reset.

mod common;

use chrono::Duration;
use common::{ctx, harness, TEST_PASSWORD};
use fleetgate_auth::services::ServiceError;

#[tokio::test]
async fn sixth_attempt_is_locked_even_with_correct_password() {
    let h = harness().await;
    h.register_verified("driver@acme.test").await;

    for attempt in 1..=4 {
        let err = h
            .auth
            .login("driver@acme.test", "WrongPass1!", None, &ctx())
            .await
            .err()
            .expect("wrong password must fail");
        assert!(
            matches!(err, ServiceError::InvalidCredentials),
            "attempt {} should be invalid_credentials, got {:?}",
            attempt,
            err.code()
        );
    }

    // The fifth failure crosses the threshold.
    let err = h
        .auth
        .login("driver@acme.test", "WrongPass1!", None, &ctx())
        .await
        .err()
        .unwrap();
    assert!(matches!(
        err,
        ServiceError::AccountLocked {
            minutes_remaining: 15
        }
    ));

    // Sixth attempt with the correct password is still rejected.
    let err = h
        .auth
        .login("driver@acme.test", TEST_PASSWORD, None, &ctx())
        .await
        .err()
        .unwrap();
    assert!(matches!(err, ServiceError::AccountLocked { .. }));
}

#[tokio::test]
async fn lock_lifts_lazily_after_fifteen_minutes() {
    let h = harness().await;
    h.register_verified("driver@acme.test").await;

    for _ in 0..5 {
        let _ = h
            .auth
            .login("driver@acme.test", "WrongPass1!", None, &ctx())
            .await;
    }

    h.clock.advance(Duration::minutes(14));
    let err = h
        .auth
        .login("driver@acme.test", TEST_PASSWORD, None, &ctx())
        .await
        .err()
        .unwrap();
    assert!(matches!(
        err,
        ServiceError::AccountLocked {
            minutes_remaining: 1
        }
    ));

    // One more minute and the lock has expired; no explicit unlock happens.
    h.clock.advance(Duration::minutes(1));
    h.auth
        .login("driver@acme.test", TEST_PASSWORD, None, &ctx())
        .await
        .expect("login must succeed once the lock expired");
}

#[tokio::test]
async fn successful_login_resets_the_counter() {
    let h = harness().await;
    let identity = h.register_verified("driver@acme.test").await;

    for _ in 0..4 {
        let _ = h
            .auth
            .login("driver@acme.test", "WrongPass1!", None, &ctx())
            .await;
    }

    h.auth
        .login("driver@acme.test", TEST_PASSWORD, None, &ctx())
        .await
        .expect("correct password before the threshold must succeed");

    // Counter is back at zero: four more failures still do not lock.
    for _ in 0..4 {
        let err = h
            .auth
            .login("driver@acme.test", "WrongPass1!", None, &ctx())
            .await
            .err()
            .unwrap();
        assert!(matches!(err, ServiceError::InvalidCredentials));
    }
    assert_eq!(h.lockout.check_locked(identity.identity_id).await.unwrap(), None);
}

#[tokio::test]
async fn expired_lock_restarts_counting_from_zero() {
    let h = harness().await;
    let identity = h.register_verified("driver@acme.test").await;

    for _ in 0..5 {
        let _ = h
            .auth
            .login("driver@acme.test", "WrongPass1!", None, &ctx())
            .await;
    }
    assert!(h
        .lockout
        .check_locked(identity.identity_id)
        .await
        .unwrap()
        .is_some());

    h.clock.advance(Duration::minutes(16));

    // A failure after expiry behaves as the first failure of a fresh window.
    let err = h
        .auth
        .login("driver@acme.test", "WrongPass1!", None, &ctx())
        .await
        .err()
        .unwrap();
    assert!(matches!(err, ServiceError::InvalidCredentials));
    assert_eq!(h.lockout.check_locked(identity.identity_id).await.unwrap(), None);
}

#[tokio::test]
async fn lockout_emits_account_locked_event() {
    let h = harness().await;
    let identity = h.register_verified("driver@acme.test").await;

    for _ in 0..5 {
        let _ = h
            .auth
            .login("driver@acme.test", "WrongPass1!", None, &ctx())
            .await;
    }

    let events = h.audit.recent(identity.identity_id, 50).await.unwrap();
    let locked = events
        .iter()
        .filter(|e| e.event_type_code == "account_locked")
        .count();
    let failed = events
        .iter()
        .filter(|e| e.event_type_code == "login_failed")
        .count();
    assert_eq!(locked, 1);
    assert_eq!(failed, 5);
}
