// tests/epoch_monotonic.rs

use std::sync::Arc;
use std::time::Duration;

use fenced_rmstore::core::client::fake::FakeCoordinationClient;
use fenced_rmstore::core::client::session::SessionHandle;
use fenced_rmstore::core::client::{AclEntry, Perms};
use fenced_rmstore::core::fencing::FencingMode;
use fenced_rmstore::core::layout::codec::OversizeBlobPolicy;
use fenced_rmstore::core::recovery::store::StoreOptions;
use fenced_rmstore::core::retry::RetryPolicy;
use fenced_rmstore::RmStateStore;
use proptest::prelude::*;

fn options() -> StoreOptions {
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

proptest! {
    #[test]
    fn epoch_is_strictly_increasing_across_n_calls(num_calls in 1usize..50) {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let client = Arc::new(FakeCoordinationClient::new());
            let session = SessionHandle::new();
            let store = Arc::new(RmStateStore::new(client, session, options()));
            store.init().await.unwrap();
            store.start().await.unwrap();

            let mut previous: Option<u64> = None;
            for _ in 0..num_calls {
                let epoch = store.get_and_increment_epoch().await.unwrap();
                if let Some(prev) = previous {
                    prop_assert!(epoch > prev);
                }
                previous = Some(epoch);
            }
            Ok(())
        })?;
    }
}
