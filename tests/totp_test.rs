//! TOTP second-factor properties: state machine, confirmation with zero
//! tolerance, login-time drift window, recovery-code fallback.

mod common;

use common::{ctx, harness, TEST_PASSWORD};
use fleetgate_auth::services::{SecondFactorProof, ServiceError};
use fleetgate_auth::utils::Clock;
use totp_rs::{Algorithm, Secret, TOTP};

fn code_generator(secret_base32: &str) -> TOTP {
    let bytes = Secret::Encoded(secret_base32.to_string())
        .to_bytes()
        .expect("enrollment secret must be valid base32");
    TOTP::new(Algorithm::SHA1, 6, 0, 30, bytes, None, "driver@acme.test".to_string())
        .expect("TOTP construction")
}

#[tokio::test]
async fn enable_confirm_walks_the_state_machine() {
    let h = harness().await;
    let identity = h.register_verified("driver@acme.test").await;
    assert_eq!(identity.totp_state_code, "disabled");

    let enrollment = h.two_factor.enable(&identity).await.unwrap();
    assert!(enrollment.provisioning_uri.starts_with("otpauth://totp/"));
    assert_eq!(enrollment.recovery_codes.len(), 8);

    let identity = h.reload(&identity).await;
    assert_eq!(identity.totp_state_code, "pending");

    let totp = code_generator(&enrollment.secret_base32);
    let now = h.clock.now().timestamp() as u64;

    // Wrong code: state unchanged.
    let err = h
        .two_factor
        .confirm(&identity, "000000", &ctx())
        .await
        .err()
        .unwrap();
    assert!(matches!(err, ServiceError::InvalidTwoFactorCode));
    assert_eq!(h.reload(&identity).await.totp_state_code, "pending");

    h.two_factor
        .confirm(&identity, &totp.generate(now), &ctx())
        .await
        .expect("current-step code must confirm");

    let identity = h.reload(&identity).await;
    assert_eq!(identity.totp_state_code, "enabled");
    assert!(identity.totp_confirmed_utc.is_some());
}

#[tokio::test]
async fn confirmation_has_zero_tolerance() {
    let h = harness().await;
    let identity = h.register_verified("driver@acme.test").await;
    let enrollment = h.two_factor.enable(&identity).await.unwrap();
    let identity = h.reload(&identity).await;

    let totp = code_generator(&enrollment.secret_base32);
    let now = h.clock.now().timestamp() as u64;

    // A code from the previous step is rejected at confirmation time even
    // though the login-time window would accept it.
    let stale = totp.generate(now - 30);
    let err = h
        .two_factor
        .confirm(&identity, &stale, &ctx())
        .await
        .err()
        .unwrap();
    assert!(matches!(err, ServiceError::InvalidTwoFactorCode));

    h.two_factor
        .confirm(&identity, &totp.generate(now), &ctx())
        .await
        .unwrap();
}

#[tokio::test]
async fn verification_accepts_two_steps_of_drift_and_no_more() {
    let h = harness().await;
    let identity = h.register_verified("driver@acme.test").await;
    let enrollment = h.two_factor.enable(&identity).await.unwrap();
    let identity = h.reload(&identity).await;

    let totp = code_generator(&enrollment.secret_base32);
    let now = h.clock.now().timestamp() as u64;
    h.two_factor
        .confirm(&identity, &totp.generate(now), &ctx())
        .await
        .unwrap();
    let identity = h.reload(&identity).await;

    for offset in [-2i64, -1, 0, 1, 2] {
        let code = totp.generate((now as i64 + offset * 30) as u64);
        let proof = h
            .two_factor
            .verify(&identity, &code, &ctx())
            .await
            .unwrap_or_else(|e| panic!("offset {} must verify, got {:?}", offset, e.code()));
        assert_eq!(proof, SecondFactorProof::Totp);
    }

    for offset in [-3i64, 3] {
        let code = totp.generate((now as i64 + offset * 30) as u64);
        let result = h.two_factor.verify(&identity, &code, &ctx()).await;
        // A +/-3-step code may collide with a valid window code only by the
        // one-in-a-million birthday of 6-digit codes; treat any success here
        // as a failure of the window bound.
        assert!(
            matches!(result, Err(ServiceError::InvalidTwoFactorCode)),
            "offset {} must be outside the window",
            offset
        );
    }
}

#[tokio::test]
async fn recovery_code_satisfies_verification_and_signals_reprovision() {
    let h = harness().await;
    let identity = h.register_verified("driver@acme.test").await;
    let enrollment = h.two_factor.enable(&identity).await.unwrap();
    let identity = h.reload(&identity).await;

    let totp = code_generator(&enrollment.secret_base32);
    let now = h.clock.now().timestamp() as u64;
    h.two_factor
        .confirm(&identity, &totp.generate(now), &ctx())
        .await
        .unwrap();
    let identity = h.reload(&identity).await;

    let proof = h
        .two_factor
        .verify(&identity, &enrollment.recovery_codes[0], &ctx())
        .await
        .unwrap();
    assert_eq!(proof, SecondFactorProof::RecoveryCode { remaining: 7 });
    assert!(proof.needs_reprovision());

    // Burned: the same code is dead.
    let err = h
        .two_factor
        .verify(&identity, &enrollment.recovery_codes[0], &ctx())
        .await
        .err()
        .unwrap();
    assert!(matches!(err, ServiceError::InvalidTwoFactorCode));
}

#[tokio::test]
async fn disable_requires_fresh_password_and_wipes_everything() {
    let h = harness().await;
    let identity = h.register_verified("driver@acme.test").await;
    let enrollment = h.two_factor.enable(&identity).await.unwrap();
    let identity = h.reload(&identity).await;

    let totp = code_generator(&enrollment.secret_base32);
    let now = h.clock.now().timestamp() as u64;
    h.two_factor
        .confirm(&identity, &totp.generate(now), &ctx())
        .await
        .unwrap();
    let identity = h.reload(&identity).await;

    let err = h
        .two_factor
        .disable(&identity, "WrongPass1!", &ctx())
        .await
        .err()
        .unwrap();
    assert!(matches!(err, ServiceError::InvalidCredentials));
    assert_eq!(h.reload(&identity).await.totp_state_code, "enabled");

    h.two_factor
        .disable(&identity, TEST_PASSWORD, &ctx())
        .await
        .unwrap();

    let identity = h.reload(&identity).await;
    assert_eq!(identity.totp_state_code, "disabled");
    assert!(identity.totp_secret_enc.is_none());
    assert_eq!(h.vault.remaining(identity.identity_id).await.unwrap(), 0);
}

#[tokio::test]
async fn enable_is_only_valid_from_disabled() {
    let h = harness().await;
    let identity = h.register_verified("driver@acme.test").await;

    h.two_factor.enable(&identity).await.unwrap();
    let identity = h.reload(&identity).await;

    let err = h.two_factor.enable(&identity).await.err().unwrap();
    assert!(matches!(err, ServiceError::AlreadyEnabled));
}

#[tokio::test]
async fn regenerating_codes_requires_password_and_kills_old_pool() {
    let h = harness().await;
    let identity = h.register_verified("driver@acme.test").await;
    let enrollment = h.two_factor.enable(&identity).await.unwrap();
    let identity = h.reload(&identity).await;

    let totp = code_generator(&enrollment.secret_base32);
    let now = h.clock.now().timestamp() as u64;
    h.two_factor
        .confirm(&identity, &totp.generate(now), &ctx())
        .await
        .unwrap();
    let identity = h.reload(&identity).await;

    let err = h
        .two_factor
        .regenerate_recovery_codes(&identity, "WrongPass1!", &ctx())
        .await
        .err()
        .unwrap();
    assert!(matches!(err, ServiceError::InvalidCredentials));

    let fresh = h
        .two_factor
        .regenerate_recovery_codes(&identity, TEST_PASSWORD, &ctx())
        .await
        .unwrap();
    assert_eq!(fresh.len(), 8);

    let err = h
        .two_factor
        .verify(&identity, &enrollment.recovery_codes[0], &ctx())
        .await
        .err()
        .unwrap();
    assert!(matches!(err, ServiceError::InvalidTwoFactorCode));
}
