//! Session registry properties: ordering, touch, revocation scopes.

mod common;

use chrono::Duration;
use common::{ctx, harness};

#[tokio::test]
async fn issued_token_authenticates_until_revoked() {
    let h = harness().await;
    let identity = h.register_verified("driver@acme.test").await;

    let (token, session) = h
        .sessions
        .issue(&identity, Some("phone".to_string()), None, &ctx())
        .await
        .unwrap();

    let (resolved_identity, resolved_session) = h
        .sessions
        .authenticate(&token)
        .await
        .unwrap()
        .expect("live token must authenticate");
    assert_eq!(resolved_identity.identity_id, identity.identity_id);
    assert_eq!(resolved_session.session_id, session.session_id);

    h.sessions
        .revoke(&identity, session.session_id, &ctx())
        .await
        .unwrap();
    assert!(h.sessions.authenticate(&token).await.unwrap().is_none());
}

#[tokio::test]
async fn list_active_orders_by_newest_activity() {
    let h = harness().await;
    let identity = h.register_verified("driver@acme.test").await;

    let (_, first) = h
        .sessions
        .issue(&identity, Some("laptop".to_string()), None, &ctx())
        .await
        .unwrap();
    h.clock.advance(Duration::minutes(1));
    let (_, second) = h
        .sessions
        .issue(&identity, Some("phone".to_string()), None, &ctx())
        .await
        .unwrap();

    let listed = h.sessions.list_active(identity.identity_id).await.unwrap();
    assert_eq!(listed[0].session_id, second.session_id);
    assert_eq!(listed[1].session_id, first.session_id);

    // Touching the older session moves it to the front.
    h.clock.advance(Duration::minutes(1));
    h.sessions.touch(first.session_id).await.unwrap();
    let listed = h.sessions.list_active(identity.identity_id).await.unwrap();
    assert_eq!(listed[0].session_id, first.session_id);
}

#[tokio::test]
async fn revoke_others_keeps_only_the_calling_session() {
    let h = harness().await;
    let identity = h.register_verified("driver@acme.test").await;

    let (current_token, _) = h.sessions.issue(&identity, None, None, &ctx()).await.unwrap();
    let (other_a, _) = h.sessions.issue(&identity, None, None, &ctx()).await.unwrap();
    let (other_b, _) = h.sessions.issue(&identity, None, None, &ctx()).await.unwrap();

    let revoked = h
        .sessions
        .revoke_others(
            &identity,
            &fleetgate_auth::utils::hash_token(&current_token),
            &ctx(),
        )
        .await
        .unwrap();
    assert_eq!(revoked, 2);

    assert!(h.sessions.authenticate(&current_token).await.unwrap().is_some());
    assert!(h.sessions.authenticate(&other_a).await.unwrap().is_none());
    assert!(h.sessions.authenticate(&other_b).await.unwrap().is_none());
}

#[tokio::test]
async fn revoke_all_includes_the_calling_session() {
    let h = harness().await;
    let identity = h.register_verified("driver@acme.test").await;

    let (token_a, _) = h.sessions.issue(&identity, None, None, &ctx()).await.unwrap();
    let (token_b, _) = h.sessions.issue(&identity, None, None, &ctx()).await.unwrap();

    let revoked = h.sessions.revoke_all(&identity, &ctx()).await.unwrap();
    assert_eq!(revoked, 2);

    assert!(h.sessions.authenticate(&token_a).await.unwrap().is_none());
    assert!(h.sessions.authenticate(&token_b).await.unwrap().is_none());
    assert!(h
        .sessions
        .list_active(identity.identity_id)
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn sessions_expire_with_their_ttl() {
    let h = harness().await;
    let identity = h.register_verified("driver@acme.test").await;

    let (token, _) = h.sessions.issue(&identity, None, None, &ctx()).await.unwrap();

    h.clock.advance(Duration::days(29));
    assert!(h.sessions.authenticate(&token).await.unwrap().is_some());

    h.clock.advance(Duration::days(2));
    assert!(h.sessions.authenticate(&token).await.unwrap().is_none());
}

#[tokio::test]
async fn revoking_a_foreign_session_is_not_found() {
    let h = harness().await;
    let alice = h.register_verified("alice@acme.test").await;
    let bob = h.register_verified("bob@acme.test").await;

    let (_, bob_session) = h.sessions.issue(&bob, None, None, &ctx()).await.unwrap();

    let err = h
        .sessions
        .revoke(&alice, bob_session.session_id, &ctx())
        .await
        .err()
        .expect("revoking another identity's session must fail");
    assert!(matches!(
        err,
        fleetgate_auth::services::ServiceError::NotFound
    ));
    // Bob's session is untouched.
    assert_eq!(h.sessions.list_active(bob.identity_id).await.unwrap().len(), 1);
}
