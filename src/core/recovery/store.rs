// src/core/recovery/store.rs

//! `RmStateStore`: the public recovery & mutation API (C5), assembling the
//! coordination client (C1), retry engine (C2), fencing discipline (C3), and
//! layout/codec glue (C4) into the operations a resource manager calls.

use std::sync::Arc;
use std::sync::atomic::{AtomicI32, AtomicU64, Ordering};
use std::time::Duration;

use tokio::sync::watch;

use super::types::{
    AmrmTokenSecretManagerState, ApplicationAttemptState, ApplicationState, DelegationKey,
    DelegationTokenRecord, RmState, Version,
};
use crate::core::client::{AclEntry, CoordinationClient, CreateMode, MultiOp};
use crate::core::client::session::{SessionHandle, SessionState};
use crate::core::errors::{CoordinationError, StoreError};
use crate::core::fencing::prober::LivenessProber;
use crate::core::fencing::{FencingGuard, FencingMode};
use crate::core::layout::codec::{BincodeRecordCodec, OversizeBlobPolicy, RecordCodec};
use crate::core::layout::paths::Layout;
use crate::core::retry::{run_with_retry, ReconnectHandle, RetryPolicy};

/// Static configuration `RmStateStore::new` needs; distinct from
/// `crate::config::StoreConfig` so this module does not depend on the
/// top-level config-file schema.
pub struct StoreOptions {
    pub parent_path: String,
    pub znode_size_limit: usize,
    pub oversize_policy: OversizeBlobPolicy,
    pub fencing_mode: FencingMode,
    pub root_principals: Vec<AclEntry>,
    pub retry_policy: RetryPolicy,
    pub prober_interval: Duration,
}

struct Reconnector<C: CoordinationClient + 'static> {
    client: Arc<C>,
    session: Arc<SessionHandle>,
    root_path: String,
}

#[async_trait::async_trait]
impl<C: CoordinationClient + 'static> ReconnectHandle for Reconnector<C> {
    async fn reconnect_and_resync(&self) -> Result<(), StoreError> {
        self.session.set_state(SessionState::Connecting);
        self.client
            .reconnect()
            .await
            .map_err(StoreError::Coordination)?;
        self.client
            .sync(&self.root_path)
            .await
            .map_err(StoreError::Coordination)?;
        self.session.set_state(SessionState::Connected);
        Ok(())
    }

    async fn mark_fenced(&self, _epoch: u64) {
        self.session.set_state(SessionState::Fenced);
    }
}

pub struct RmStateStore<C: CoordinationClient + 'static> {
    client: Arc<C>,
    layout: Layout,
    fencing: Arc<FencingGuard>,
    retry_policy: RetryPolicy,
    codec: BincodeRecordCodec,
    session: Arc<SessionHandle>,
    size_limit: usize,
    oversize_policy: OversizeBlobPolicy,
    root_principals: Vec<AclEntry>,
    prober_interval: Duration,
    prober_stop: watch::Sender<bool>,
    started: std::sync::atomic::AtomicBool,
    sequence_number: AtomicI32,
    local_epoch_hint: AtomicU64,
}

impl<C: CoordinationClient + 'static> RmStateStore<C> {
    pub fn new(client: Arc<C>, session: Arc<SessionHandle>, options: StoreOptions) -> Self {
        let layout = Layout::new(options.parent_path);
        let fencing = Arc::new(FencingGuard::new(layout.clone(), options.fencing_mode));
        let (prober_stop, _rx) = watch::channel(false);
        Self {
            client,
            layout,
            fencing,
            retry_policy: options.retry_policy,
            codec: BincodeRecordCodec,
            session,
            size_limit: options.znode_size_limit,
            oversize_policy: options.oversize_policy,
            root_principals: options.root_principals,
            prober_interval: options.prober_interval,
            prober_stop,
            started: std::sync::atomic::AtomicBool::new(false),
            sequence_number: AtomicI32::new(0),
            local_epoch_hint: AtomicU64::new(0),
        }
    }

    fn reconnector(&self) -> Reconnector<C> {
        Reconnector {
            client: Arc::clone(&self.client),
            session: Arc::clone(&self.session),
            root_path: self.layout.state_root(),
        }
    }

    pub fn is_fenced(&self) -> bool {
        self.session.is_fenced()
    }

    /// Creates the fixed znode skeleton under the store root if absent.
    /// Idempotent: running `init` against an already-initialized store is a
    /// no-op.
    pub async fn init(&self) -> Result<(), StoreError> {
        self.session.set_state(SessionState::Connecting);
        for path in self.layout.containers() {
            match self
                .client
                .create(&path, Vec::new(), vec![AclEntry::world_all()], CreateMode::Persistent)
                .await
            {
                Ok(_) => {}
                Err(CoordinationError::NodeExists(_)) => {}
                Err(e) => return Err(StoreError::Coordination(e)),
            }
        }
        // Created once up front so every subsequent write is a `setData`,
        // never a `create`: the sequence number node always exists.
        match self
            .client
            .create(
                &self.layout.dt_sequential_number_node(),
                0i32.to_be_bytes().to_vec(),
                vec![AclEntry::world_all()],
                CreateMode::Persistent,
            )
            .await
        {
            Ok(_) => {}
            Err(CoordinationError::NodeExists(_)) => {}
            Err(e) => return Err(StoreError::Coordination(e)),
        }
        self.session.set_state(SessionState::Connected);
        Ok(())
    }

    /// Establishes fencing over the root and starts the liveness prober.
    /// Must be called once `init()` has succeeded and before any mutation.
    pub async fn start(self: &Arc<Self>) -> Result<(), StoreError> {
        self.fencing
            .establish(self.client.as_ref(), &self.root_principals)
            .await?;

        let stop_rx = self.prober_stop.subscribe();
        let prober = LivenessProber::new(
            Arc::clone(&self.fencing),
            Arc::clone(&self.client),
            self.prober_interval,
        );
        let session = Arc::clone(&self.session);
        tokio::spawn(prober.run(stop_rx, move |_err| {
            session.set_state(SessionState::Fenced);
        }));

        self.started.store(true, Ordering::SeqCst);
        Ok(())
    }

    /// Stops the liveness prober and releases the underlying session.
    pub async fn close(&self) -> Result<(), StoreError> {
        let _ = self.prober_stop.send(true);
        self.client
            .close()
            .await
            .map_err(StoreError::Coordination)?;
        Ok(())
    }

    fn require_started(&self) -> Result<(), StoreError> {
        if !self.started.load(Ordering::SeqCst) {
            return Err(StoreError::NotStarted);
        }
        if self.is_fenced() {
            return Err(StoreError::Fenced {
                epoch: self.local_epoch_hint.load(Ordering::SeqCst),
            });
        }
        Ok(())
    }

    async fn retry<T, F, Fut>(&self, operation_name: &str, op: F) -> Result<T, StoreError>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T, CoordinationError>>,
    {
        let reconnector = self.reconnector();
        let epoch = self.local_epoch_hint.load(Ordering::SeqCst);
        run_with_retry(operation_name, &self.retry_policy, &reconnector, epoch, op).await
    }

    fn encode_guarded<T: serde::Serialize + serde::de::DeserializeOwned>(
        &self,
        path: &str,
        record: &T,
    ) -> Result<Option<Vec<u8>>, StoreError> {
        let bytes = RecordCodec::<T>::encode(&self.codec, record)?;
        if crate::core::layout::codec::check_size(path, &bytes, self.size_limit, self.oversize_policy)? {
            Ok(Some(bytes))
        } else {
            Ok(None)
        }
    }

    // ---- version ----

    pub async fn load_version(&self) -> Result<Option<Version>, StoreError> {
        self.require_started()?;
        let path = self.layout.version_node();
        match self.retry("load_version", || {
            let path = path.clone();
            async move { self.client.get_data(&path, false).await }
        }).await {
            Ok((bytes, _stat)) => {
                if bytes.len() != 8 {
                    return Err(StoreError::Codec(format!(
                        "version node at {path} has unexpected length {}",
                        bytes.len()
                    )));
                }
                let major = u32::from_be_bytes(bytes[0..4].try_into().unwrap());
                let minor = u32::from_be_bytes(bytes[4..8].try_into().unwrap());
                Ok(Some(Version { major, minor }))
            }
            Err(StoreError::Coordination(CoordinationError::NoNode(_))) => Ok(None),
            Err(e) => Err(e),
        }
    }

    pub async fn store_version(&self, version: Version) -> Result<(), StoreError> {
        self.require_started()?;
        let path = self.layout.version_node();
        let mut bytes = Vec::with_capacity(8);
        bytes.extend_from_slice(&version.major.to_be_bytes());
        bytes.extend_from_slice(&version.minor.to_be_bytes());
        let result = self
            .retry("store_version_create", || {
                let path = path.clone();
                let bytes = bytes.clone();
                async move {
                    self.client
                        .create(&path, bytes, vec![AclEntry::world_all()], CreateMode::Persistent)
                        .await
                }
            })
            .await;
        match result {
            Ok(_) => Ok(()),
            Err(StoreError::Coordination(ref e)) if crate::core::retry::is_idempotent_create_conflict(e) => {
                self.retry("store_version_update", || {
                    let path = path.clone();
                    let bytes = bytes.clone();
                    async move { self.client.set_data(&path, bytes, None).await }
                })
                .await
                .map(|_| ())
            }
            Err(e) => Err(e),
        }
    }

    // ---- epoch ----

    /// Reads the current epoch, increments it by one, and writes it back
    /// inside a single fenced mutation, returning the pre-increment value
    /// (so the first caller against a fresh store observes `0`).
    pub async fn get_and_increment_epoch(&self) -> Result<u64, StoreError> {
        self.require_started()?;
        let path = self.layout.epoch_node();

        let existing = self
            .retry("get_and_increment_epoch_read", || {
                let path = path.clone();
                async move { self.client.exists(&path, false).await }
            })
            .await?;

        let current = match &existing {
            Some(_) => {
                let (bytes, _stat) = self
                    .retry("get_and_increment_epoch_get_data", || {
                        let path = path.clone();
                        async move { self.client.get_data(&path, false).await }
                    })
                    .await?;
                u64::from_be_bytes(bytes.try_into().unwrap_or_default())
            }
            None => 0,
        };
        let next = current + 1;
        let ops = vec![if existing.is_some() {
            MultiOp::SetData {
                path: path.clone(),
                data: next.to_be_bytes().to_vec(),
                version: None,
            }
        } else {
            MultiOp::Create {
                path: path.clone(),
                data: next.to_be_bytes().to_vec(),
                acl: vec![AclEntry::world_all()],
                mode: CreateMode::Persistent,
            }
        }];
        self.retry("get_and_increment_epoch", || {
            let ops = ops.clone();
            async move { self.fencing.fenced_multi(self.client.as_ref(), ops).await }
        })
        .await?;
        self.local_epoch_hint.store(next, Ordering::SeqCst);
        Ok(current)
    }

    // ---- applications ----

    pub async fn store_application(&self, app: &ApplicationState) -> Result<(), StoreError> {
        self.require_started()?;
        let path = self.layout.app_node(&app.app_id);
        let Some(bytes) = self.encode_guarded(&path, app)? else {
            return Ok(());
        };
        let ops = vec![MultiOp::Create {
            path: path.clone(),
            data: bytes,
            acl: vec![AclEntry::world_all()],
            mode: CreateMode::Persistent,
        }];
        self.retry("store_application", || {
            let ops = ops.clone();
            async move { self.fencing.fenced_multi(self.client.as_ref(), ops).await }
        })
        .await
    }

    pub async fn update_application(&self, app: &ApplicationState) -> Result<(), StoreError> {
        self.require_started()?;
        let path = self.layout.app_node(&app.app_id);
        let Some(bytes) = self.encode_guarded(&path, app)? else {
            return Ok(());
        };
        let ops = vec![MultiOp::SetData {
            path,
            data: bytes,
            version: None,
        }];
        self.retry("update_application", || {
            let ops = ops.clone();
            async move { self.fencing.fenced_multi(self.client.as_ref(), ops).await }
        })
        .await
    }

    /// Removes an application and all of its attempts atomically: every
    /// attempt child must be deleted in the same fenced multi as the
    /// application node itself, so a crash mid-removal never leaves an
    /// orphaned attempt behind.
    pub async fn remove_application(&self, app_id: &str) -> Result<(), StoreError> {
        self.require_started()?;
        let app_path = self.layout.app_node(app_id);
        let children = self
            .client
            .get_children(&app_path, false)
            .await
            .unwrap_or_default();
        let mut ops: Vec<MultiOp> = children
            .iter()
            .map(|attempt_id| MultiOp::Delete {
                path: self.layout.app_attempt_node(app_id, attempt_id),
                version: None,
            })
            .collect();
        ops.push(MultiOp::Delete {
            path: app_path,
            version: None,
        });
        self.retry("remove_application", || {
            let ops = ops.clone();
            async move { self.fencing.fenced_multi(self.client.as_ref(), ops).await }
        })
        .await
    }

    pub async fn store_application_attempt(
        &self,
        app_id: &str,
        attempt: &ApplicationAttemptState,
    ) -> Result<(), StoreError> {
        self.require_started()?;
        let path = self.layout.app_attempt_node(app_id, &attempt.attempt_id);
        let Some(bytes) = self.encode_guarded(&path, attempt)? else {
            return Ok(());
        };
        let ops = vec![MultiOp::Create {
            path,
            data: bytes,
            acl: vec![AclEntry::world_all()],
            mode: CreateMode::Persistent,
        }];
        self.retry("store_application_attempt", || {
            let ops = ops.clone();
            async move { self.fencing.fenced_multi(self.client.as_ref(), ops).await }
        })
        .await
    }

    pub async fn update_application_attempt(
        &self,
        app_id: &str,
        attempt: &ApplicationAttemptState,
    ) -> Result<(), StoreError> {
        self.require_started()?;
        let path = self.layout.app_attempt_node(app_id, &attempt.attempt_id);
        let Some(bytes) = self.encode_guarded(&path, attempt)? else {
            return Ok(());
        };
        let ops = vec![MultiOp::SetData {
            path,
            data: bytes,
            version: None,
        }];
        self.retry("update_application_attempt", || {
            let ops = ops.clone();
            async move { self.fencing.fenced_multi(self.client.as_ref(), ops).await }
        })
        .await
    }

    pub async fn remove_application_attempt(
        &self,
        app_id: &str,
        attempt_id: &str,
    ) -> Result<(), StoreError> {
        self.require_started()?;
        let path = self.layout.app_attempt_node(app_id, attempt_id);
        let ops = vec![MultiOp::Delete { path, version: None }];
        self.retry("remove_application_attempt", || {
            let ops = ops.clone();
            async move { self.fencing.fenced_multi(self.client.as_ref(), ops).await }
        })
        .await
    }

    pub async fn load_application_attempts(
        &self,
        app_id: &str,
    ) -> Result<Vec<ApplicationAttemptState>, StoreError> {
        self.require_started()?;
        let app_path = self.layout.app_node(app_id);
        let children = self
            .client
            .get_children(&app_path, true)
            .await
            .map_err(StoreError::Coordination)?;
        let mut attempts = Vec::with_capacity(children.len());
        for attempt_id in children {
            let path = self.layout.app_attempt_node(app_id, &attempt_id);
            let (bytes, _stat) = self
                .client
                .get_data(&path, true)
                .await
                .map_err(StoreError::Coordination)?;
            attempts.push(RecordCodec::<ApplicationAttemptState>::decode(&self.codec, &bytes)?);
        }
        Ok(attempts)
    }

    // ---- delegation tokens & keys ----

    pub async fn store_master_key(&self, key: &DelegationKey) -> Result<(), StoreError> {
        self.require_started()?;
        let path = self.layout.dt_master_key_node(key.key_id);
        let Some(bytes) = self.encode_guarded(&path, key)? else {
            return Ok(());
        };
        let ops = vec![MultiOp::Create {
            path,
            data: bytes,
            acl: vec![AclEntry::world_all()],
            mode: CreateMode::Persistent,
        }];
        self.retry("store_master_key", || {
            let ops = ops.clone();
            async move { self.fencing.fenced_multi(self.client.as_ref(), ops).await }
        })
        .await
    }

    pub async fn remove_master_key(&self, key_id: i32) -> Result<(), StoreError> {
        self.require_started()?;
        let path = self.layout.dt_master_key_node(key_id);
        let ops = vec![MultiOp::Delete { path, version: None }];
        self.retry("remove_master_key", || {
            let ops = ops.clone();
            async move { self.fencing.fenced_multi(self.client.as_ref(), ops).await }
        })
        .await
    }

    /// Creates `token`'s node and advances the persisted sequence-number
    /// node to `latest_sequence_number` in a single fenced multi, so a crash
    /// between the two writes never happens.
    pub async fn store_delegation_token(
        &self,
        token: &DelegationTokenRecord,
        latest_sequence_number: i32,
    ) -> Result<(), StoreError> {
        self.require_started()?;
        let path = self.layout.delegation_token_node(token.sequence_number);
        let Some(bytes) = self.encode_guarded(&path, token)? else {
            return Ok(());
        };
        let ops = vec![
            MultiOp::Create {
                path,
                data: bytes,
                acl: vec![AclEntry::world_all()],
                mode: CreateMode::Persistent,
            },
            MultiOp::SetData {
                path: self.layout.dt_sequential_number_node(),
                data: latest_sequence_number.to_be_bytes().to_vec(),
                version: None,
            },
        ];
        self.retry("store_delegation_token", || {
            let ops = ops.clone();
            async move { self.fencing.fenced_multi(self.client.as_ref(), ops).await }
        })
        .await
    }

    /// Rewrites an existing token's data and the sequence-number node in a
    /// single fenced multi; unlike `store_delegation_token` both ops here are
    /// `setData`, since the token node and the sequence-number node already
    /// exist.
    pub async fn update_delegation_token(
        &self,
        token: &DelegationTokenRecord,
        latest_sequence_number: i32,
    ) -> Result<(), StoreError> {
        self.require_started()?;
        let path = self.layout.delegation_token_node(token.sequence_number);
        let Some(bytes) = self.encode_guarded(&path, token)? else {
            return Ok(());
        };
        let ops = vec![
            MultiOp::SetData {
                path,
                data: bytes,
                version: None,
            },
            MultiOp::SetData {
                path: self.layout.dt_sequential_number_node(),
                data: latest_sequence_number.to_be_bytes().to_vec(),
                version: None,
            },
        ];
        self.retry("update_delegation_token", || {
            let ops = ops.clone();
            async move { self.fencing.fenced_multi(self.client.as_ref(), ops).await }
        })
        .await
    }

    pub async fn remove_delegation_token(&self, sequence_number: i32) -> Result<(), StoreError> {
        self.require_started()?;
        let path = self.layout.delegation_token_node(sequence_number);
        let ops = vec![MultiOp::Delete { path, version: None }];
        self.retry("remove_delegation_token", || {
            let ops = ops.clone();
            async move { self.fencing.fenced_multi(self.client.as_ref(), ops).await }
        })
        .await
    }

    pub async fn next_sequence_number(&self) -> i32 {
        self.sequence_number.fetch_add(1, Ordering::SeqCst) + 1
    }

    // ---- AMRM token secret manager ----

    pub async fn store_amrm_state(
        &self,
        state: &AmrmTokenSecretManagerState,
    ) -> Result<(), StoreError> {
        self.require_started()?;
        let path = self.layout.amrm_token_secret_manager_root();
        let bytes = RecordCodec::<AmrmTokenSecretManagerState>::encode(&self.codec, state)?;
        let result = self
            .retry("store_amrm_state_create", || {
                let path = path.clone();
                let bytes = bytes.clone();
                async move {
                    self.client
                        .create(&path, bytes, vec![AclEntry::world_all()], CreateMode::Persistent)
                        .await
                }
            })
            .await;
        match result {
            Ok(_) => Ok(()),
            Err(StoreError::Coordination(ref e)) if crate::core::retry::is_idempotent_create_conflict(e) => {
                self.retry("store_amrm_state_update", || {
                    let path = path.clone();
                    let bytes = bytes.clone();
                    async move { self.client.set_data(&path, bytes, None).await }
                })
                .await
                .map(|_| ())
            }
            Err(e) => Err(e),
        }
    }

    // ---- full recovery ----

    /// Reads back everything needed to reconstruct resource-manager state
    /// after a failover: every application and its attempts, every
    /// delegation key and token, and the AMRM token secret manager state.
    /// Blobs dropped on write under `OversizeBlobPolicy::Drop` are simply
    /// absent here, never surfaced as a load error.
    pub async fn load_state(&self) -> Result<RmState, StoreError> {
        self.require_started()?;
        let app_root = self.layout.app_root();
        let app_ids = self
            .client
            .get_children(&app_root, true)
            .await
            .map_err(StoreError::Coordination)?;

        let mut applications = Vec::with_capacity(app_ids.len());
        for app_id in &app_ids {
            let path = self.layout.app_node(app_id);
            let (bytes, _stat) = match self.client.get_data(&path, true).await {
                Ok(v) => v,
                Err(CoordinationError::NoNode(_)) => continue,
                Err(e) => return Err(StoreError::Coordination(e)),
            };
            let app: ApplicationState = RecordCodec::decode(&self.codec, &bytes)?;
            let attempts = self.load_application_attempts(app_id).await?;
            applications.push((app, attempts));
        }

        let master_keys_root = self.layout.dt_master_keys_root();
        let key_children = self
            .client
            .get_children(&master_keys_root, true)
            .await
            .unwrap_or_default();
        let mut delegation_keys = Vec::with_capacity(key_children.len());
        for child in key_children {
            let path = format!("{master_keys_root}/{child}");
            if let Ok((bytes, _)) = self.client.get_data(&path, true).await {
                delegation_keys.push(RecordCodec::decode(&self.codec, &bytes)?);
            }
        }

        let secret_root = self.layout.secret_manager_root();
        let secret_children = self
            .client
            .get_children(&secret_root, true)
            .await
            .unwrap_or_default();
        let mut delegation_tokens = Vec::new();
        for child in secret_children {
            if !child.starts_with("RMDelegationToken_") {
                continue;
            }
            let path = format!("{secret_root}/{child}");
            if let Ok((bytes, _)) = self.client.get_data(&path, true).await {
                delegation_tokens.push(RecordCodec::decode(&self.codec, &bytes)?);
            }
        }

        let dt_sequence_number = match self
            .client
            .get_data(&self.layout.dt_sequential_number_node(), true)
            .await
        {
            Ok((bytes, _)) => i32::from_be_bytes(bytes.try_into().unwrap_or_default()),
            Err(_) => 0,
        };

        let amrm_token_state = match self
            .client
            .get_data(&self.layout.amrm_token_secret_manager_root(), true)
            .await
        {
            Ok((bytes, _)) => Some(RecordCodec::decode(&self.codec, &bytes)?),
            Err(_) => None,
        };

        Ok(RmState {
            applications,
            delegation_keys,
            delegation_tokens,
            amrm_token_state,
            dt_sequence_number,
        })
    }
}
