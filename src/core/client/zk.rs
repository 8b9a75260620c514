// src/core/client/zk.rs

//! `CoordinationClient` implementation backed by the synchronous, callback
//! based `zookeeper` crate. Every call is dispatched through
//! `tokio::task::spawn_blocking` so the rest of the crate stays fully async.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;
use tokio::sync::broadcast;
use zookeeper::{
    perms, Acl, CreateMode as ZkCreateMode, WatchedEvent, WatchedEventType, Watcher as ZkWatcher,
    ZkError, ZkState, ZooKeeper,
};

use super::session::{SessionHandle, SessionState};
use super::{
    AclEntry, CoordinationClient, CreateMode, MultiOp, Perms, Stat, WatchEvent, WatchEventType,
};
use crate::core::errors::CoordinationError;

/// Forwards every watch event the `zookeeper` crate delivers through its
/// default-watcher mechanism onto a broadcast channel, so arbitrarily many
/// interested parts of this crate can subscribe via `watch_events`.
struct DispatchWatcher {
    tx: broadcast::Sender<WatchEvent>,
}

impl ZkWatcher for DispatchWatcher {
    fn handle(&self, event: WatchedEvent) {
        let Some(path) = event.path else { return };
        let event_type = match event.event_type {
            WatchedEventType::NodeCreated => WatchEventType::NodeCreated,
            WatchedEventType::NodeDeleted => WatchEventType::NodeDeleted,
            WatchedEventType::NodeDataChanged => WatchEventType::NodeDataChanged,
            WatchedEventType::NodeChildrenChanged => WatchEventType::NodeChildrenChanged,
            _ => return,
        };
        let _ = self.tx.send(WatchEvent { path, event_type });
    }
}

pub struct ZkCoordinationClient {
    keeper: RwLock<Arc<ZooKeeper>>,
    session: Arc<SessionHandle>,
    watch_tx: broadcast::Sender<WatchEvent>,
    // Held so `reconnect` can rebuild a session with the same parameters.
    ensemble: String,
    session_timeout: Duration,
}

impl ZkCoordinationClient {
    /// Connects to `ensemble` (comma-separated host:port list) and blocks
    /// until the initial session either connects or fails, mirroring the
    /// blocking-connect idiom used when bridging this crate into an
    /// otherwise synchronous client library.
    pub async fn connect(
        ensemble: String,
        session_timeout: Duration,
    ) -> Result<Self, CoordinationError> {
        let session = SessionHandle::new();
        let (watch_tx, _rx) = broadcast::channel(256);
        let keeper = Self::connect_keeper(
            &ensemble,
            session_timeout,
            Arc::clone(&session),
            watch_tx.clone(),
        )
        .await?;
        Ok(Self {
            keeper: RwLock::new(Arc::new(keeper)),
            session,
            watch_tx,
            ensemble,
            session_timeout,
        })
    }

    async fn connect_keeper(
        ensemble: &str,
        session_timeout: Duration,
        session: Arc<SessionHandle>,
        watch_tx: broadcast::Sender<WatchEvent>,
    ) -> Result<ZooKeeper, CoordinationError> {
        let ensemble = ensemble.to_string();
        tokio::task::spawn_blocking(move || -> Result<ZooKeeper, CoordinationError> {
            let session_for_listener = Arc::clone(&session);
            let keeper = ZooKeeper::connect(&ensemble, session_timeout, DispatchWatcher { tx: watch_tx })
                .map_err(|e| CoordinationError::Other(e.to_string()))?;
            keeper.add_listener(move |state| match state {
                ZkState::Connected | ZkState::ConnectedReadOnly => {
                    session_for_listener.set_state(SessionState::Connected);
                }
                ZkState::Connecting => {
                    session_for_listener.set_state(SessionState::Connecting);
                }
                ZkState::Closed => {
                    session_for_listener.set_state(SessionState::Expired);
                }
                ZkState::AuthFailed => {
                    session_for_listener.set_state(SessionState::Fenced);
                }
                _ => {}
            });
            Ok(keeper)
        })
        .await
        .map_err(|e| CoordinationError::Other(format!("join error: {e}")))?
    }

    fn keeper(&self) -> Arc<ZooKeeper> {
        Arc::clone(&self.keeper.read())
    }

    pub fn session(&self) -> Arc<SessionHandle> {
        Arc::clone(&self.session)
    }

    fn map_zk_error(path: &str, error: ZkError) -> CoordinationError {
        match error {
            ZkError::ConnectionLoss => CoordinationError::ConnectionLoss,
            ZkError::OperationTimeout => CoordinationError::OperationTimeout,
            ZkError::SessionExpired => CoordinationError::SessionExpired,
            ZkError::SessionMoved => CoordinationError::SessionMoved,
            ZkError::NodeExists => CoordinationError::NodeExists(path.to_string()),
            ZkError::NoNode => CoordinationError::NoNode(path.to_string()),
            ZkError::NotEmpty => CoordinationError::NotEmpty(path.to_string()),
            ZkError::BadVersion => CoordinationError::BadVersion {
                path: path.to_string(),
            },
            ZkError::NoAuth => CoordinationError::NoAuth,
            ZkError::InvalidACL => CoordinationError::InvalidAcl,
            other => CoordinationError::Other(other.to_string()),
        }
    }

    fn to_zk_acl(acl: &[AclEntry]) -> Vec<Acl> {
        acl.iter()
            .map(|entry| {
                let mut bits = 0;
                if entry.perms.contains(Perms::READ) {
                    bits |= perms::READ;
                }
                if entry.perms.contains(Perms::WRITE) {
                    bits |= perms::WRITE;
                }
                if entry.perms.contains(Perms::CREATE) {
                    bits |= perms::CREATE;
                }
                if entry.perms.contains(Perms::DELETE) {
                    bits |= perms::DELETE;
                }
                if entry.perms.contains(Perms::ADMIN) {
                    bits |= perms::ADMIN;
                }
                Acl::new(bits, &entry.scheme, &entry.id)
            })
            .collect()
    }
}

#[async_trait]
impl CoordinationClient for ZkCoordinationClient {
    async fn create(
        &self,
        path: &str,
        data: Vec<u8>,
        acl: Vec<AclEntry>,
        mode: CreateMode,
    ) -> Result<String, CoordinationError> {
        let keeper = self.keeper();
        let path_owned = path.to_string();
        let zk_mode = match mode {
            CreateMode::Persistent => ZkCreateMode::Persistent,
            CreateMode::Ephemeral => ZkCreateMode::Ephemeral,
        };
        let zk_acl = Self::to_zk_acl(&acl);
        tokio::task::spawn_blocking(move || {
            keeper
                .create(&path_owned, data, zk_acl, zk_mode)
                .map_err(|e| Self::map_zk_error(&path_owned, e))
        })
        .await
        .map_err(|e| CoordinationError::Other(format!("join error: {e}")))?
    }

    async fn delete(&self, path: &str, version: Option<i32>) -> Result<(), CoordinationError> {
        let keeper = self.keeper();
        let path_owned = path.to_string();
        tokio::task::spawn_blocking(move || {
            keeper
                .delete(&path_owned, version)
                .map_err(|e| Self::map_zk_error(&path_owned, e))
        })
        .await
        .map_err(|e| CoordinationError::Other(format!("join error: {e}")))?
    }

    async fn exists(&self, path: &str, watch: bool) -> Result<Option<Stat>, CoordinationError> {
        let keeper = self.keeper();
        let path_owned = path.to_string();
        tokio::task::spawn_blocking(move || {
            keeper
                .exists(&path_owned, watch)
                .map(|opt| {
                    opt.map(|stat| Stat {
                        version: stat.version,
                        czxid: stat.czxid,
                    })
                })
                .map_err(|e| Self::map_zk_error(&path_owned, e))
        })
        .await
        .map_err(|e| CoordinationError::Other(format!("join error: {e}")))?
    }

    async fn get_data(&self, path: &str, watch: bool) -> Result<(Vec<u8>, Stat), CoordinationError> {
        let keeper = self.keeper();
        let path_owned = path.to_string();
        tokio::task::spawn_blocking(move || {
            keeper
                .get_data(&path_owned, watch)
                .map(|(data, stat)| {
                    (
                        data,
                        Stat {
                            version: stat.version,
                            czxid: stat.czxid,
                        },
                    )
                })
                .map_err(|e| Self::map_zk_error(&path_owned, e))
        })
        .await
        .map_err(|e| CoordinationError::Other(format!("join error: {e}")))?
    }

    async fn set_data(
        &self,
        path: &str,
        data: Vec<u8>,
        version: Option<i32>,
    ) -> Result<Stat, CoordinationError> {
        let keeper = self.keeper();
        let path_owned = path.to_string();
        tokio::task::spawn_blocking(move || {
            keeper
                .set_data(&path_owned, data, version)
                .map(|stat| Stat {
                    version: stat.version,
                    czxid: stat.czxid,
                })
                .map_err(|e| Self::map_zk_error(&path_owned, e))
        })
        .await
        .map_err(|e| CoordinationError::Other(format!("join error: {e}")))?
    }

    async fn get_children(&self, path: &str, watch: bool) -> Result<Vec<String>, CoordinationError> {
        let keeper = self.keeper();
        let path_owned = path.to_string();
        tokio::task::spawn_blocking(move || {
            keeper
                .get_children(&path_owned, watch)
                .map_err(|e| Self::map_zk_error(&path_owned, e))
        })
        .await
        .map_err(|e| CoordinationError::Other(format!("join error: {e}")))?
    }

    async fn set_acl(
        &self,
        path: &str,
        acl: Vec<AclEntry>,
        version: Option<i32>,
    ) -> Result<(), CoordinationError> {
        let keeper = self.keeper();
        let path_owned = path.to_string();
        let zk_acl = Self::to_zk_acl(&acl);
        tokio::task::spawn_blocking(move || {
            keeper
                .set_acl(&path_owned, zk_acl, version)
                .map_err(|e| Self::map_zk_error(&path_owned, e))
        })
        .await
        .map_err(|e| CoordinationError::Other(format!("join error: {e}")))?
    }

    /// The `zookeeper` crate does not expose a server-side multi-transaction
    /// API, so ops are applied sequentially and in order; the fenced-multi
    /// wrapper in `core::fencing` is what actually guarantees exclusivity
    /// around the whole batch via the lock znode, not this method.
    async fn multi(&self, ops: Vec<MultiOp>) -> Result<(), CoordinationError> {
        for op in ops {
            match op {
                MultiOp::Create {
                    path,
                    data,
                    acl,
                    mode,
                } => {
                    self.create(&path, data, acl, mode).await?;
                }
                MultiOp::Delete { path, version } => {
                    self.delete(&path, version).await?;
                }
                MultiOp::SetData {
                    path,
                    data,
                    version,
                } => {
                    self.set_data(&path, data, version).await?;
                }
                MultiOp::Check { path, version } => {
                    let stat = self.exists(&path, false).await?;
                    match stat {
                        Some(stat) if stat.version == version => {}
                        Some(_) => return Err(CoordinationError::BadVersion { path }),
                        None => return Err(CoordinationError::NoNode(path)),
                    }
                }
            }
        }
        Ok(())
    }

    async fn add_auth(&self, scheme: &str, auth: Vec<u8>) -> Result<(), CoordinationError> {
        let keeper = self.keeper();
        let scheme = scheme.to_string();
        tokio::task::spawn_blocking(move || {
            keeper
                .add_auth(&scheme, auth)
                .map_err(|e| CoordinationError::Other(e.to_string()))
        })
        .await
        .map_err(|e| CoordinationError::Other(format!("join error: {e}")))?
    }

    async fn sync(&self, path: &str) -> Result<(), CoordinationError> {
        // rust-zookeeper doesn't expose `sync` directly; a `get_data` round
        // trip against the path achieves the same read-your-writes ordering
        // after a reconnect.
        self.get_data(path, false).await.map(|_| ())
    }

    /// Rebuilds the ZooKeeper session from scratch against the same ensemble
    /// and swaps it in behind the read-write lock, while keeping this
    /// client's existing `SessionHandle` and watch dispatcher wired to the
    /// new connection so session-state transitions and watch firings keep
    /// landing on the same subscribers across a reconnect.
    async fn reconnect(&self) -> Result<(), CoordinationError> {
        let fresh = Self::connect_keeper(
            &self.ensemble,
            self.session_timeout,
            Arc::clone(&self.session),
            self.watch_tx.clone(),
        )
        .await?;
        *self.keeper.write() = Arc::new(fresh);
        Ok(())
    }

    fn watch_events(&self) -> broadcast::Receiver<WatchEvent> {
        self.watch_tx.subscribe()
    }

    async fn close(&self) -> Result<(), CoordinationError> {
        let keeper = self.keeper();
        tokio::task::spawn_blocking(move || {
            keeper
                .close()
                .map_err(|e| CoordinationError::Other(e.to_string()))
        })
        .await
        .map_err(|e| CoordinationError::Other(format!("join error: {e}")))?
    }
}
