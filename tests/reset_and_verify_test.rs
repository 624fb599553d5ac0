//! Mail-driven flows: password reset (enumeration-safe, single use) and
//! email verification.

mod common;

use chrono::Duration;
use common::{ctx, harness, MailKind, TEST_PASSWORD};
use fleetgate_auth::services::ServiceError;

#[tokio::test]
async fn reset_request_is_generic_for_unknown_emails() {
    let h = harness().await;
    h.register_verified("driver@acme.test").await;
    let before = h.email.count();

    // Unknown address: same Ok outcome, no mail.
    h.auth
        .request_password_reset("nobody@acme.test", &ctx())
        .await
        .unwrap();
    assert_eq!(h.email.count(), before);

    // Known address: same Ok outcome, one mail.
    h.auth
        .request_password_reset("driver@acme.test", &ctx())
        .await
        .unwrap();
    assert_eq!(h.email.count(), before + 1);
}

#[tokio::test]
async fn reset_token_rewrites_the_credential_and_revokes_sessions() {
    let h = harness().await;
    h.register_verified("driver@acme.test").await;

    let login = h
        .auth
        .login("driver@acme.test", TEST_PASSWORD, None, &ctx())
        .await
        .unwrap();
    let old_token = match login {
        fleetgate_auth::services::LoginOutcome::Success { token, .. } => token,
        _ => panic!("plain login must succeed"),
    };

    h.auth
        .request_password_reset("driver@acme.test", &ctx())
        .await
        .unwrap();
    let mail = h.email.last(MailKind::PasswordReset).expect("reset mail");
    assert_eq!(mail.to, "driver@acme.test");

    assert!(h
        .auth
        .validate_password_reset("driver@acme.test", &mail.token)
        .await
        .unwrap());

    h.auth
        .confirm_password_reset("driver@acme.test", &mail.token, "Brand!New42", &ctx())
        .await
        .unwrap();

    // Every session is gone, the old password is dead, the new one works.
    assert!(h.sessions.authenticate(&old_token).await.unwrap().is_none());
    assert!(h
        .auth
        .login("driver@acme.test", TEST_PASSWORD, None, &ctx())
        .await
        .is_err());
    h.auth
        .login("driver@acme.test", "Brand!New42", None, &ctx())
        .await
        .unwrap();

    // The token was consumed: replay fails, validation reports dead.
    let err = h
        .auth
        .confirm_password_reset("driver@acme.test", &mail.token, "Another!Pw7", &ctx())
        .await
        .err()
        .unwrap();
    assert!(matches!(err, ServiceError::TokenInvalid));
    assert!(!h
        .auth
        .validate_password_reset("driver@acme.test", &mail.token)
        .await
        .unwrap());
}

#[tokio::test]
async fn a_weak_replacement_does_not_burn_the_reset_token() {
    let h = harness().await;
    h.register_verified("driver@acme.test").await;

    h.auth
        .request_password_reset("driver@acme.test", &ctx())
        .await
        .unwrap();
    let mail = h.email.last(MailKind::PasswordReset).unwrap();

    let err = h
        .auth
        .confirm_password_reset("driver@acme.test", &mail.token, "weak", &ctx())
        .await
        .err()
        .unwrap();
    assert!(matches!(err, ServiceError::PasswordPolicyViolation { .. }));

    // The token survives the rejected attempt.
    h.auth
        .confirm_password_reset("driver@acme.test", &mail.token, "Brand!New42", &ctx())
        .await
        .unwrap();
}

#[tokio::test]
async fn reset_token_expires_after_an_hour() {
    let h = harness().await;
    h.register_verified("driver@acme.test").await;

    h.auth
        .request_password_reset("driver@acme.test", &ctx())
        .await
        .unwrap();
    let mail = h.email.last(MailKind::PasswordReset).unwrap();

    h.clock.advance(Duration::minutes(61));
    let err = h
        .auth
        .confirm_password_reset("driver@acme.test", &mail.token, "Brand!New42", &ctx())
        .await
        .err()
        .unwrap();
    assert!(matches!(err, ServiceError::TokenExpired));
}

#[tokio::test]
async fn a_new_reset_request_invalidates_the_outstanding_token() {
    let h = harness().await;
    h.register_verified("driver@acme.test").await;

    h.auth
        .request_password_reset("driver@acme.test", &ctx())
        .await
        .unwrap();
    let first = h.email.last(MailKind::PasswordReset).unwrap();

    h.auth
        .request_password_reset("driver@acme.test", &ctx())
        .await
        .unwrap();
    let second = h.email.last(MailKind::PasswordReset).unwrap();
    assert_ne!(first.token, second.token);

    let err = h
        .auth
        .confirm_password_reset("driver@acme.test", &first.token, "Brand!New42", &ctx())
        .await
        .err()
        .unwrap();
    assert!(matches!(err, ServiceError::TokenInvalid));

    h.auth
        .confirm_password_reset("driver@acme.test", &second.token, "Brand!New42", &ctx())
        .await
        .unwrap();
}

#[tokio::test]
async fn registration_sends_a_verification_token_that_opens_the_login_gate() {
    let h = harness().await;
    let identity = h.register("pending@acme.test").await;

    let mail = h
        .email
        .last(MailKind::Verification)
        .expect("registration must send a verification mail");
    assert_eq!(mail.to, "pending@acme.test");

    // Gate is closed until the token is used.
    assert!(matches!(
        h.auth
            .login("pending@acme.test", TEST_PASSWORD, None, &ctx())
            .await
            .err()
            .unwrap(),
        ServiceError::EmailUnverified
    ));

    h.auth
        .verify_email("pending@acme.test", &mail.token, &ctx())
        .await
        .unwrap();

    let identity = h.reload(&identity).await;
    assert!(identity.is_email_verified());

    h.auth
        .login("pending@acme.test", TEST_PASSWORD, None, &ctx())
        .await
        .expect("verified identity must log in");

    // Verification tokens are single-use too.
    let err = h
        .auth
        .verify_email("pending@acme.test", &mail.token, &ctx())
        .await
        .err()
        .unwrap();
    assert!(matches!(err, ServiceError::TokenInvalid));
}

#[tokio::test]
async fn resending_verification_replaces_the_token() {
    let h = harness().await;
    let identity = h.register("pending@acme.test").await;
    let first = h.email.last(MailKind::Verification).unwrap();

    h.auth.send_verification_email(&identity).await.unwrap();
    let second = h.email.last(MailKind::Verification).unwrap();
    assert_ne!(first.token, second.token);

    let err = h
        .auth
        .verify_email("pending@acme.test", &first.token, &ctx())
        .await
        .err()
        .unwrap();
    assert!(matches!(err, ServiceError::TokenInvalid));

    h.auth
        .verify_email("pending@acme.test", &second.token, &ctx())
        .await
        .unwrap();
}
