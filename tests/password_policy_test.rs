//! Password policy properties: violation reporting, reuse detection,
//! bounded history.

mod common;

use common::{ctx, harness, TEST_PASSWORD};
use fleetgate_auth::services::{PasswordPolicy, PolicyViolation, ServiceError};
use fleetgate_auth::store::Store;
use fleetgate_auth::utils::{hash_token, Password};

#[tokio::test]
async fn weak1_reports_length_and_symbol_violations() {
    let h = harness().await;

    let err = h
        .auth
        .register(h.tenant_id, "weak@acme.test", "Weak1", None, &ctx())
        .await
        .err()
        .expect("weak password must be rejected");

    match err {
        ServiceError::PasswordPolicyViolation { violations } => {
            assert_eq!(
                violations,
                vec![
                    PolicyViolation::TooShort {
                        min_length: 8,
                        actual_length: 5
                    },
                    PolicyViolation::MissingSymbol,
                ]
            );
        }
        other => panic!("expected policy violation, got {:?}", other.code()),
    }
}

#[tokio::test]
async fn strong_password_registers_with_zero_violations() {
    let h = harness().await;

    assert!(PasswordPolicy::validate_strength("Str0ng!Pass").is_empty());
    let identity = h
        .auth
        .register(h.tenant_id, "strong@acme.test", "Str0ng!Pass", None, &ctx())
        .await
        .expect("strong password must register");
    assert!(!identity.is_email_verified());
}

#[tokio::test]
async fn changing_to_a_recent_password_is_rejected() {
    let h = harness().await;
    let identity = h.register_verified("user@acme.test").await;
    let token_hash = hash_token("not-a-live-session");

    let err = h
        .auth
        .change_password(&identity, TEST_PASSWORD, TEST_PASSWORD, &token_hash, &ctx())
        .await
        .err()
        .expect("reusing the live password must fail");
    assert!(matches!(err, ServiceError::PasswordReused));
}

#[tokio::test]
async fn history_retains_only_the_five_most_recent() {
    let h = harness().await;
    let mut identity = h.register_verified("user@acme.test").await;
    let token_hash = hash_token("not-a-live-session");

    // Rotate through five new passwords; the registration password ends up
    // outside the retained window.
    let mut current = TEST_PASSWORD.to_string();
    for i in 1..=5 {
        let next = format!("Rotated!Pw{}", i);
        h.auth
            .change_password(&identity, &current, &next, &token_hash, &ctx())
            .await
            .unwrap_or_else(|e| panic!("rotation {} failed: {:?}", i, e.code()));
        identity = h.reload(&identity).await;
        current = next;
    }

    assert!(
        !h.policy
            .is_reused(identity.identity_id, &Password::new(TEST_PASSWORD.to_string()))
            .await
            .unwrap(),
        "the original password must have been pruned from history"
    );

    // The most recent rotations are still inside the window.
    assert!(h
        .policy
        .is_reused(identity.identity_id, &Password::new("Rotated!Pw5".to_string()))
        .await
        .unwrap());
    assert!(h
        .policy
        .is_reused(identity.identity_id, &Password::new("Rotated!Pw1".to_string()))
        .await
        .unwrap());

    let entries = h
        .store
        .list_password_history(identity.identity_id, 10)
        .await
        .unwrap();
    assert_eq!(entries.len(), 5);
}

#[tokio::test]
async fn pruned_password_becomes_acceptable_again() {
    let h = harness().await;
    let mut identity = h.register_verified("user@acme.test").await;
    let token_hash = hash_token("not-a-live-session");

    let mut current = TEST_PASSWORD.to_string();
    for i in 1..=5 {
        let next = format!("Rotated!Pw{}", i);
        h.auth
            .change_password(&identity, &current, &next, &token_hash, &ctx())
            .await
            .unwrap();
        identity = h.reload(&identity).await;
        current = next;
    }

    h.auth
        .change_password(&identity, &current, TEST_PASSWORD, &token_hash, &ctx())
        .await
        .expect("a password outside the history window is acceptable again");
}
