//! Exercises SurrealStore against the embedded in-memory engine.

use chrono::Utc;
use doc_store::{CreateAck, DocumentStore, WriteRequest};
use surreal_store::{surreal_connect_with_retries, SurrealOpts, SurrealStore};

async fn memory_store() -> SurrealStore {
    let opts = SurrealOpts {
        endpoint: "mem://".to_string(),
        username: "root".to_string(),
        password: "root".to_string(),
        namespace: "test".to_string(),
        database: "test".to_string(),
    };
    let client = surreal_connect_with_retries(&opts, 1, std::time::Duration::from_millis(1))
        .await
        .expect("in-memory engine should start");
    SurrealStore::new(client)
}

fn request(table: &str, id: Option<&str>, body: &str) -> WriteRequest {
    WriteRequest::new(table, "activity", Utc::now(), body).with_id(id.map(str::to_string))
}

#[tokio::test]
async fn test_create_and_exists() {
    let store = memory_store().await;

    assert!(!store.exists("tweets").await.unwrap());
    assert_eq!(store.create("tweets").await.unwrap(), CreateAck::Created);
    assert!(store.exists("tweets").await.unwrap());
}

#[tokio::test]
async fn test_create_rejects_unsafe_names() {
    let store = memory_store().await;
    assert!(store.create("bad name").await.is_err());
}

#[tokio::test]
async fn test_bulk_submit_writes_records() {
    let store = memory_store().await;
    store.create("tweets").await.unwrap();

    let outcomes = store
        .bulk_submit(&[
            request("tweets", Some("one"), r#"{"text":"first"}"#),
            request("tweets", Some("two"), r#"{"text":"second"}"#),
            request("tweets", None, r#"{"text":"third"}"#),
        ])
        .await
        .unwrap();

    assert_eq!(outcomes.len(), 3);
    assert!(outcomes.iter().all(|o| o.is_ok()), "{outcomes:?}");
    assert_eq!(store.count_records("tweets").await.unwrap(), 3);
}

#[tokio::test]
async fn test_bulk_submit_upserts_by_id() {
    let store = memory_store().await;

    store
        .bulk_submit(&[request("tweets", Some("one"), r#"{"v":1}"#)])
        .await
        .unwrap();
    store
        .bulk_submit(&[request("tweets", Some("one"), r#"{"v":2}"#)])
        .await
        .unwrap();

    assert_eq!(store.count_records("tweets").await.unwrap(), 1);
}

#[tokio::test]
async fn test_invalid_payload_fails_only_that_item() {
    let store = memory_store().await;

    let outcomes = store
        .bulk_submit(&[
            request("tweets", Some("good"), r#"{"ok":true}"#),
            request("tweets", Some("bad"), "{not json"),
        ])
        .await
        .unwrap();

    assert!(outcomes[0].is_ok());
    assert!(!outcomes[1].is_ok());
    assert_eq!(store.count_records("tweets").await.unwrap(), 1);
}

#[tokio::test]
async fn test_refresh_knobs_are_accepted() {
    let store = memory_store().await;
    store
        .update_setting("tweets", "refresh_interval", "-1")
        .await
        .unwrap();
    store.refresh("tweets").await.unwrap();
}
