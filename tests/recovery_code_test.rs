//! Recovery code vault properties: pool size, single use, case
//! insensitivity, regeneration.

mod common;

use common::harness;
use uuid::Uuid;

#[tokio::test]
async fn pool_holds_eight_distinct_codes() {
    let h = harness().await;
    let identity_id = Uuid::new_v4();

    let codes = h.vault.generate(identity_id).await.unwrap();
    assert_eq!(codes.len(), 8);

    let mut unique = codes.clone();
    unique.sort();
    unique.dedup();
    assert_eq!(unique.len(), 8);
    assert_eq!(h.vault.remaining(identity_id).await.unwrap(), 8);
}

#[tokio::test]
async fn each_code_is_consumed_at_most_once() {
    let h = harness().await;
    let identity_id = Uuid::new_v4();
    let codes = h.vault.generate(identity_id).await.unwrap();

    let first = &codes[0];
    assert_eq!(h.vault.consume(identity_id, first).await.unwrap(), Some(7));
    assert_eq!(h.vault.consume(identity_id, first).await.unwrap(), None);
    assert_eq!(h.vault.remaining(identity_id).await.unwrap(), 7);
}

#[tokio::test]
async fn matching_is_case_insensitive_and_ignores_hyphens() {
    let h = harness().await;
    let identity_id = Uuid::new_v4();
    let codes = h.vault.generate(identity_id).await.unwrap();

    let mangled = codes[1].to_lowercase().replace('-', "");
    assert!(h.vault.consume(identity_id, &mangled).await.unwrap().is_some());
    assert_eq!(h.vault.consume(identity_id, &codes[1]).await.unwrap(), None);
}

#[tokio::test]
async fn unknown_code_leaves_the_pool_untouched() {
    let h = harness().await;
    let identity_id = Uuid::new_v4();
    h.vault.generate(identity_id).await.unwrap();

    assert_eq!(
        h.vault.consume(identity_id, "AAAAA-AAAAA").await.unwrap(),
        None
    );
    assert_eq!(h.vault.remaining(identity_id).await.unwrap(), 8);
}

#[tokio::test]
async fn regeneration_invalidates_all_previous_codes() {
    let h = harness().await;
    let identity_id = Uuid::new_v4();

    let old_codes = h.vault.generate(identity_id).await.unwrap();
    let new_codes = h.vault.generate(identity_id).await.unwrap();

    for code in &old_codes {
        assert_eq!(h.vault.consume(identity_id, code).await.unwrap(), None);
    }
    assert!(h
        .vault
        .consume(identity_id, &new_codes[0])
        .await
        .unwrap()
        .is_some());
}

#[tokio::test]
async fn entire_pool_can_be_drained() {
    let h = harness().await;
    let identity_id = Uuid::new_v4();
    let codes = h.vault.generate(identity_id).await.unwrap();

    for (i, code) in codes.iter().enumerate() {
        let remaining = h.vault.consume(identity_id, code).await.unwrap();
        assert_eq!(remaining, Some((8 - i - 1) as i64));
    }
    assert_eq!(h.vault.remaining(identity_id).await.unwrap(), 0);
}
