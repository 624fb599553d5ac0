//! End-to-end login sequencing: enumeration resistance, the unverified-email
//! gate, the two-factor challenge hop, and change-password session fencing.

mod common;

use common::{ctx, harness, TEST_PASSWORD};
use fleetgate_auth::services::{LoginOutcome, ServiceError};
use fleetgate_auth::store::Store;
use fleetgate_auth::utils::{hash_token, Clock};
use totp_rs::{Algorithm, Secret, TOTP};

#[tokio::test]
async fn unknown_email_and_wrong_password_are_indistinguishable() {
    let h = harness().await;
    h.register_verified("driver@acme.test").await;

    let unknown = h
        .auth
        .login("nobody@acme.test", TEST_PASSWORD, None, &ctx())
        .await
        .err()
        .unwrap();
    let wrong = h
        .auth
        .login("driver@acme.test", "WrongPass1!", None, &ctx())
        .await
        .err()
        .unwrap();

    assert!(matches!(unknown, ServiceError::InvalidCredentials));
    assert!(matches!(wrong, ServiceError::InvalidCredentials));
    assert_eq!(unknown.code(), wrong.code());
    assert_eq!(unknown.to_string(), wrong.to_string());
}

#[tokio::test]
async fn unverified_email_is_a_gate_not_a_failure() {
    let h = harness().await;
    let identity = h.register("pending@acme.test").await;

    // Correct password, unverified address: rejected without touching the
    // lockout counter, repeatedly.
    for _ in 0..6 {
        let err = h
            .auth
            .login("pending@acme.test", TEST_PASSWORD, None, &ctx())
            .await
            .err()
            .unwrap();
        assert!(matches!(err, ServiceError::EmailUnverified));
    }
    assert_eq!(h.lockout.check_locked(identity.identity_id).await.unwrap(), None);
    // No lockout record was ever created: the gate is not a credential failure.
    assert!(h
        .store
        .get_lockout(identity.identity_id)
        .await
        .unwrap()
        .is_none());

    // Verifying the email opens the gate.
    h.store
        .mark_email_verified(identity.identity_id, h.clock.now())
        .await
        .unwrap();
    h.auth
        .login("pending@acme.test", TEST_PASSWORD, None, &ctx())
        .await
        .expect("verified identity must log in");
}

async fn enroll_two_factor(
    h: &common::TestHarness,
    identity: &fleetgate_auth::models::Identity,
) -> TOTP {
    let enrollment = h.two_factor.enable(identity).await.unwrap();
    let identity = h.reload(identity).await;

    let bytes = Secret::Encoded(enrollment.secret_base32.clone())
        .to_bytes()
        .unwrap();
    let totp = TOTP::new(Algorithm::SHA1, 6, 0, 30, bytes, None, identity.email.clone()).unwrap();

    let now = h.clock.now().timestamp() as u64;
    h.two_factor
        .confirm(&identity, &totp.generate(now), &ctx())
        .await
        .unwrap();
    totp
}

#[tokio::test]
async fn two_factor_login_requires_the_challenge_hop() {
    let h = harness().await;
    let identity = h.register_verified("driver@acme.test").await;
    let totp = enroll_two_factor(&h, &identity).await;

    let outcome = h
        .auth
        .login("driver@acme.test", TEST_PASSWORD, None, &ctx())
        .await
        .unwrap();
    let (identity_id, challenge) = match outcome {
        LoginOutcome::TwoFactorRequired {
            identity_id,
            challenge_token,
        } => (identity_id, challenge_token),
        LoginOutcome::Success { .. } => panic!("second factor must be demanded"),
    };
    assert_eq!(identity_id, identity.identity_id);

    // Wrong code: challenge survives for a retry.
    let now = h.clock.now().timestamp() as u64;
    let err = h
        .auth
        .verify_two_factor(identity_id, &challenge, "000000", None, &ctx())
        .await
        .err()
        .unwrap();
    assert!(matches!(err, ServiceError::InvalidTwoFactorCode));

    let login = h
        .auth
        .verify_two_factor(identity_id, &challenge, &totp.generate(now), None, &ctx())
        .await
        .expect("correct code with a live challenge must complete the login");
    assert!(!login.proof.needs_reprovision());

    // The bearer token works.
    assert!(h.sessions.authenticate(&login.token).await.unwrap().is_some());

    // The challenge was burned on success.
    let err = h
        .auth
        .verify_two_factor(identity_id, &challenge, &totp.generate(now), None, &ctx())
        .await
        .err()
        .unwrap();
    assert!(matches!(
        err,
        ServiceError::TokenInvalid | ServiceError::TokenExpired
    ));
}

#[tokio::test]
async fn two_factor_challenge_expires_after_five_minutes() {
    let h = harness().await;
    let identity = h.register_verified("driver@acme.test").await;
    let totp = enroll_two_factor(&h, &identity).await;

    let outcome = h
        .auth
        .login("driver@acme.test", TEST_PASSWORD, None, &ctx())
        .await
        .unwrap();
    let challenge = match outcome {
        LoginOutcome::TwoFactorRequired { challenge_token, .. } => challenge_token,
        _ => panic!("second factor must be demanded"),
    };

    h.clock.advance(chrono::Duration::minutes(6));
    let now = h.clock.now().timestamp() as u64;
    let err = h
        .auth
        .verify_two_factor(
            identity.identity_id,
            &challenge,
            &totp.generate(now),
            None,
            &ctx(),
        )
        .await
        .err()
        .unwrap();
    assert!(matches!(err, ServiceError::TokenExpired));
}

#[tokio::test]
async fn recovery_code_login_carries_the_reprovision_hint() {
    let h = harness().await;
    let identity = h.register_verified("driver@acme.test").await;
    let enrollment = h.two_factor.enable(&identity).await.unwrap();
    let identity = h.reload(&identity).await;

    let bytes = Secret::Encoded(enrollment.secret_base32.clone())
        .to_bytes()
        .unwrap();
    let totp = TOTP::new(Algorithm::SHA1, 6, 0, 30, bytes, None, identity.email.clone()).unwrap();
    let now = h.clock.now().timestamp() as u64;
    h.two_factor
        .confirm(&identity, &totp.generate(now), &ctx())
        .await
        .unwrap();

    let outcome = h
        .auth
        .login("driver@acme.test", TEST_PASSWORD, None, &ctx())
        .await
        .unwrap();
    let challenge = match outcome {
        LoginOutcome::TwoFactorRequired { challenge_token, .. } => challenge_token,
        _ => panic!("second factor must be demanded"),
    };

    let login = h
        .auth
        .verify_two_factor(
            identity.identity_id,
            &challenge,
            &enrollment.recovery_codes[3],
            None,
            &ctx(),
        )
        .await
        .unwrap();
    assert!(login.proof.needs_reprovision());
}

#[tokio::test]
async fn change_password_fences_out_every_other_session() {
    let h = harness().await;
    let identity = h.register_verified("driver@acme.test").await;

    let laptop = h
        .auth
        .login("driver@acme.test", TEST_PASSWORD, Some("laptop".to_string()), &ctx())
        .await
        .unwrap();
    let phone = h
        .auth
        .login("driver@acme.test", TEST_PASSWORD, Some("phone".to_string()), &ctx())
        .await
        .unwrap();

    let (laptop_token, phone_token) = match (laptop, phone) {
        (
            LoginOutcome::Success { token: a, .. },
            LoginOutcome::Success { token: b, .. },
        ) => (a, b),
        _ => panic!("plain logins must succeed"),
    };

    h.auth
        .change_password(
            &identity,
            TEST_PASSWORD,
            "Fresh!Pass9",
            &hash_token(&laptop_token),
            &ctx(),
        )
        .await
        .unwrap();

    // The calling session survives; the other one is fenced out.
    assert!(h.sessions.authenticate(&laptop_token).await.unwrap().is_some());
    assert!(h.sessions.authenticate(&phone_token).await.unwrap().is_none());

    // Old password is dead, new one works.
    assert!(h
        .auth
        .login("driver@acme.test", TEST_PASSWORD, None, &ctx())
        .await
        .is_err());
    h.auth
        .login("driver@acme.test", "Fresh!Pass9", None, &ctx())
        .await
        .expect("new password must log in");
}
