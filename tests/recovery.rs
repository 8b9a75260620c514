// tests/recovery.rs

use std::sync::Arc;
use std::time::Duration;

use fenced_rmstore::core::client::fake::FakeCoordinationClient;
use fenced_rmstore::core::client::session::SessionHandle;
use fenced_rmstore::core::client::{AclEntry, Perms};
use fenced_rmstore::core::fencing::FencingMode;
use fenced_rmstore::core::layout::codec::OversizeBlobPolicy;
use fenced_rmstore::core::recovery::store::StoreOptions;
use fenced_rmstore::core::recovery::types::{
    ApplicationAttemptState, ApplicationState, DelegationTokenRecord, Version,
};
use fenced_rmstore::core::retry::RetryPolicy;
use fenced_rmstore::RmStateStore;

fn default_options() -> StoreOptions {
    StoreOptions {
        parent_path: "/rmstore".to_string(),
        znode_size_limit: 1024 * 1024,
        oversize_policy: OversizeBlobPolicy::Drop,
        fencing_mode: FencingMode::SelfManaged,
        root_principals: vec![AclEntry {
            scheme: "world".to_string(),
            id: "anyone".to_string(),
            perms: Perms::READ | Perms::WRITE,
        }],
        retry_policy: RetryPolicy::new(10, Duration::from_secs(10), false),
        prober_interval: Duration::from_secs(60),
    }
}

async fn started_store() -> Arc<RmStateStore<FakeCoordinationClient>> {
    let client = Arc::new(FakeCoordinationClient::new());
    let session = SessionHandle::new();
    let store = Arc::new(RmStateStore::new(client, session, default_options()));
    store.init().await.unwrap();
    store.start().await.unwrap();
    store
}

#[tokio::test]
async fn store_and_load_application_with_attempts() {
    let store = started_store().await;

    let app = ApplicationState {
        app_id: "application_1".into(),
        submit_time: 100,
        start_time: 101,
        user: "alice".into(),
        application_context_blob: vec![1, 2, 3],
        attempt_ids: vec!["appattempt_1".into()],
    };
    store.store_application(&app).await.unwrap();

    let attempt = ApplicationAttemptState {
        attempt_id: "appattempt_1".into(),
        master_container_blob: vec![9, 9],
        app_attempt_tokens: vec![],
        start_time: 102,
        finish_state: None,
        final_tracking_url: None,
        diagnostics: String::new(),
        finish_time: 0,
        ranked_exit_status: 0,
    };
    store
        .store_application_attempt("application_1", &attempt)
        .await
        .unwrap();

    let state = store.load_state().await.unwrap();
    assert_eq!(state.applications.len(), 1);
    let (loaded_app, loaded_attempts) = &state.applications[0];
    assert_eq!(loaded_app.app_id, "application_1");
    assert_eq!(loaded_attempts.len(), 1);
    assert_eq!(loaded_attempts[0].attempt_id, "appattempt_1");
}

#[tokio::test]
async fn remove_application_deletes_attempts_too() {
    let store = started_store().await;
    let app = ApplicationState {
        app_id: "application_2".into(),
        submit_time: 0,
        start_time: 0,
        user: "bob".into(),
        application_context_blob: vec![],
        attempt_ids: vec![],
    };
    store.store_application(&app).await.unwrap();
    let attempt = ApplicationAttemptState {
        attempt_id: "appattempt_1".into(),
        master_container_blob: vec![],
        app_attempt_tokens: vec![],
        start_time: 0,
        finish_state: None,
        final_tracking_url: None,
        diagnostics: String::new(),
        finish_time: 0,
        ranked_exit_status: 0,
    };
    store
        .store_application_attempt("application_2", &attempt)
        .await
        .unwrap();

    store.remove_application("application_2").await.unwrap();

    let state = store.load_state().await.unwrap();
    assert!(state.applications.is_empty());
}

#[tokio::test]
async fn epoch_increments_monotonically_and_starts_at_zero() {
    let store = started_store().await;
    let first = store.get_and_increment_epoch().await.unwrap();
    let second = store.get_and_increment_epoch().await.unwrap();
    let third = store.get_and_increment_epoch().await.unwrap();
    assert_eq!(first, 0);
    assert_eq!(second, 1);
    assert_eq!(third, 2);
}

#[tokio::test]
async fn oversize_blob_is_dropped_and_absent_from_load_state() {
    let mut options = default_options();
    options.znode_size_limit = 4;
    let client = Arc::new(FakeCoordinationClient::new());
    let session = SessionHandle::new();
    let store = Arc::new(RmStateStore::new(client, session, options));
    store.init().await.unwrap();
    store.start().await.unwrap();

    let app = ApplicationState {
        app_id: "application_big".into(),
        submit_time: 0,
        start_time: 0,
        user: "carol".into(),
        application_context_blob: vec![0u8; 512],
        attempt_ids: vec![],
    };
    // Should not error even though the encoded record exceeds the limit.
    store.store_application(&app).await.unwrap();

    let state = store.load_state().await.unwrap();
    assert!(state.applications.is_empty());
}

#[tokio::test]
async fn second_controller_cannot_fence_in_after_the_first() {
    let client_a = Arc::new(FakeCoordinationClient::new());
    let session_a = SessionHandle::new();
    let store_a = Arc::new(RmStateStore::new(
        Arc::clone(&client_a),
        session_a,
        default_options(),
    ));
    store_a.init().await.unwrap();
    // store_a rewrites the root ACL down to world:read,write plus its own
    // digest credential's create/delete — nobody else, including a second
    // controller sharing the same namespace, retains admin rights to redo
    // that rewrite afterward.
    store_a.start().await.unwrap();

    let client_b = Arc::new(client_a.fork_session());
    let session_b = SessionHandle::new();
    let store_b = Arc::new(RmStateStore::new(client_b, session_b, default_options()));
    store_b.init().await.unwrap();

    let result = store_b.start().await;
    assert!(result.is_err(), "a second controller must not be able to fence in over the first");
}

#[tokio::test]
async fn version_roundtrips_as_big_endian_major_minor() {
    let store = started_store().await;
    assert!(store.load_version().await.unwrap().is_none());
    store
        .store_version(Version { major: 3, minor: 1 })
        .await
        .unwrap();
    let loaded = store.load_version().await.unwrap().unwrap();
    assert_eq!(loaded, Version { major: 3, minor: 1 });
}

#[tokio::test]
async fn store_delegation_token_persists_latest_sequence_number() {
    let store = started_store().await;
    let token = DelegationTokenRecord {
        sequence_number: 7,
        token_identifier_blob: vec![1, 2, 3],
        renew_date: 1000,
    };
    store.store_delegation_token(&token, 7).await.unwrap();

    let state = store.load_state().await.unwrap();
    assert_eq!(state.dt_sequence_number, 7);
    assert_eq!(state.delegation_tokens.len(), 1);
    assert_eq!(state.delegation_tokens[0], token);
}

#[tokio::test]
async fn update_delegation_token_rewrites_token_and_sequence_number() {
    let store = started_store().await;
    let token = DelegationTokenRecord {
        sequence_number: 2,
        token_identifier_blob: vec![9],
        renew_date: 500,
    };
    store.store_delegation_token(&token, 2).await.unwrap();

    let renewed = DelegationTokenRecord {
        renew_date: 900,
        ..token.clone()
    };
    store.update_delegation_token(&renewed, 5).await.unwrap();

    let state = store.load_state().await.unwrap();
    assert_eq!(state.dt_sequence_number, 5);
    assert_eq!(state.delegation_tokens, vec![renewed]);
}
