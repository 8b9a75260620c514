// src/core/client/fake.rs

//! An in-memory `CoordinationClient` used by the test suite so the retry,
//! fencing, and recovery logic can be exercised deterministically without a
//! live ZooKeeper ensemble.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::broadcast;

use super::{
    AclEntry, CoordinationClient, CreateMode, MultiOp, Perms, Stat, WatchEvent, WatchEventType,
};
use crate::core::errors::CoordinationError;

struct Node {
    data: Vec<u8>,
    acl: Vec<AclEntry>,
    version: i32,
    czxid: i64,
    ephemeral: bool,
}

/// What kind of read registered a pending one-shot watch on a path, mirroring
/// the three ZooKeeper watch flavors this crate's trait exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WatchKind {
    Exists,
    Data,
    Children,
}

struct Inner {
    nodes: BTreeMap<String, Node>,
    credentials: Vec<(String, String)>,
    next_czxid: i64,
    watches: Vec<(String, WatchKind)>,
    /// When set, every mutating call fails with this error, used to simulate
    /// connection loss / session expiry without tearing down the map.
    fault: Option<CoordinationError>,
}

impl Inner {
    /// Fires `event_type` on `path` if any watch of a kind in `kinds` is
    /// pending there, consuming it (watches are one-shot, per ZooKeeper
    /// semantics).
    fn dispatch(&mut self, tx: &broadcast::Sender<WatchEvent>, path: &str, kinds: &[WatchKind], event_type: WatchEventType) {
        let matched = self.watches.iter().any(|(p, k)| p == path && kinds.contains(k));
        self.watches.retain(|(p, k)| !(p == path && kinds.contains(k)));
        if matched {
            let _ = tx.send(WatchEvent {
                path: path.to_string(),
                event_type,
            });
        }
    }
}

/// In-memory coordination backend. Clone to get a handle sharing the same
/// underlying namespace, which is how tests simulate two racing controllers
/// talking to "the same ensemble."
#[derive(Clone)]
pub struct FakeCoordinationClient {
    inner: Arc<Mutex<Inner>>,
    /// The digest credentials this particular handle has registered via
    /// `add_auth`, distinct per-handle even though the namespace is shared.
    my_credentials: Arc<Mutex<Vec<(String, String)>>>,
    watch_tx: broadcast::Sender<WatchEvent>,
}

impl Default for FakeCoordinationClient {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeCoordinationClient {
    pub fn new() -> Self {
        let (watch_tx, _rx) = broadcast::channel(256);
        Self {
            inner: Arc::new(Mutex::new(Inner {
                nodes: BTreeMap::new(),
                credentials: Vec::new(),
                next_czxid: 1,
                watches: Vec::new(),
                fault: None,
            })),
            my_credentials: Arc::new(Mutex::new(Vec::new())),
            watch_tx,
        }
    }

    /// Returns a second handle sharing this instance's namespace but with
    /// independent session credentials, modeling a second controller
    /// connecting to the same ensemble.
    pub fn fork_session(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            my_credentials: Arc::new(Mutex::new(Vec::new())),
            watch_tx: self.watch_tx.clone(),
        }
    }

    /// Makes every subsequent mutating call fail with `error` until cleared,
    /// used to simulate `ConnectionLoss`/`SessionExpired` scenarios.
    pub fn inject_fault(&self, error: Option<CoordinationError>) {
        self.inner.lock().fault = error;
    }

    fn check_fault(&self) -> Result<(), CoordinationError> {
        if let Some(err) = self.inner.lock().fault.clone() {
            return Err(err);
        }
        Ok(())
    }

    fn is_authorized(&self, acl: &[AclEntry], needed: Perms) -> bool {
        let mine = self.my_credentials.lock();
        for entry in acl {
            if entry.scheme == "world" && entry.id == "anyone" && entry.perms.contains(needed) {
                return true;
            }
            if entry.scheme == "digest" && entry.perms.contains(needed) {
                let (user, _) = entry.id.split_once(':').unwrap_or((entry.id.as_str(), ""));
                if mine.iter().any(|(u, _)| u == user) {
                    return true;
                }
            }
        }
        false
    }
}

#[async_trait]
impl CoordinationClient for FakeCoordinationClient {
    async fn create(
        &self,
        path: &str,
        data: Vec<u8>,
        acl: Vec<AclEntry>,
        mode: CreateMode,
    ) -> Result<String, CoordinationError> {
        self.check_fault()?;
        // Real ZooKeeper rejects `create` with an empty ACL list outright
        // (KeeperException.InvalidACLException); every caller in this crate
        // must supply a concrete ACL.
        if acl.is_empty() {
            return Err(CoordinationError::InvalidAcl);
        }
        let mut inner = self.inner.lock();
        if inner.nodes.contains_key(path) {
            return Err(CoordinationError::NodeExists(path.to_string()));
        }
        if let Some(parent) = parent_of(path) {
            if !parent.is_empty() && !inner.nodes.contains_key(&parent) {
                return Err(CoordinationError::NoNode(parent));
            }
            if let Some(parent_node) = inner.nodes.get(&parent) {
                if !self.is_authorized(&parent_node.acl, Perms::CREATE) {
                    return Err(CoordinationError::NoAuth);
                }
            }
        }
        let czxid = inner.next_czxid;
        inner.next_czxid += 1;
        inner.nodes.insert(
            path.to_string(),
            Node {
                data,
                acl,
                version: 0,
                czxid,
                ephemeral: matches!(mode, CreateMode::Ephemeral),
            },
        );
        inner.dispatch(&self.watch_tx, path, &[WatchKind::Exists, WatchKind::Data], WatchEventType::NodeCreated);
        if let Some(parent) = parent_of(path) {
            inner.dispatch(&self.watch_tx, &parent, &[WatchKind::Children], WatchEventType::NodeChildrenChanged);
        }
        Ok(path.to_string())
    }

    async fn delete(&self, path: &str, version: Option<i32>) -> Result<(), CoordinationError> {
        self.check_fault()?;
        let mut inner = self.inner.lock();
        let node = inner
            .nodes
            .get(path)
            .ok_or_else(|| CoordinationError::NoNode(path.to_string()))?;
        if let Some(v) = version {
            if node.version != v {
                return Err(CoordinationError::BadVersion {
                    path: path.to_string(),
                });
            }
        }
        if !self.is_authorized(&node.acl, Perms::DELETE) {
            return Err(CoordinationError::NoAuth);
        }
        inner.nodes.remove(path);
        inner.dispatch(
            &self.watch_tx,
            path,
            &[WatchKind::Exists, WatchKind::Data, WatchKind::Children],
            WatchEventType::NodeDeleted,
        );
        if let Some(parent) = parent_of(path) {
            inner.dispatch(&self.watch_tx, &parent, &[WatchKind::Children], WatchEventType::NodeChildrenChanged);
        }
        Ok(())
    }

    async fn exists(&self, path: &str, watch: bool) -> Result<Option<Stat>, CoordinationError> {
        self.check_fault()?;
        let mut inner = self.inner.lock();
        if watch {
            inner.watches.push((path.to_string(), WatchKind::Exists));
        }
        Ok(inner.nodes.get(path).map(|n| Stat {
            version: n.version,
            czxid: n.czxid,
        }))
    }

    async fn get_data(&self, path: &str, watch: bool) -> Result<(Vec<u8>, Stat), CoordinationError> {
        self.check_fault()?;
        let mut inner = self.inner.lock();
        let node = inner
            .nodes
            .get(path)
            .ok_or_else(|| CoordinationError::NoNode(path.to_string()))?;
        if !self.is_authorized(&node.acl, Perms::READ) {
            return Err(CoordinationError::NoAuth);
        }
        let result = (
            node.data.clone(),
            Stat {
                version: node.version,
                czxid: node.czxid,
            },
        );
        if watch {
            inner.watches.push((path.to_string(), WatchKind::Data));
        }
        Ok(result)
    }

    async fn set_data(
        &self,
        path: &str,
        data: Vec<u8>,
        version: Option<i32>,
    ) -> Result<Stat, CoordinationError> {
        self.check_fault()?;
        let mut inner = self.inner.lock();
        let node = inner
            .nodes
            .get_mut(path)
            .ok_or_else(|| CoordinationError::NoNode(path.to_string()))?;
        if let Some(v) = version {
            if node.version != v {
                return Err(CoordinationError::BadVersion {
                    path: path.to_string(),
                });
            }
        }
        if !self.is_authorized(&node.acl, Perms::WRITE) {
            return Err(CoordinationError::NoAuth);
        }
        node.data = data;
        node.version += 1;
        let stat = Stat {
            version: node.version,
            czxid: node.czxid,
        };
        inner.dispatch(&self.watch_tx, path, &[WatchKind::Exists, WatchKind::Data], WatchEventType::NodeDataChanged);
        Ok(stat)
    }

    async fn get_children(&self, path: &str, watch: bool) -> Result<Vec<String>, CoordinationError> {
        self.check_fault()?;
        let mut inner = self.inner.lock();
        if !inner.nodes.contains_key(path) && !path.is_empty() {
            return Err(CoordinationError::NoNode(path.to_string()));
        }
        let prefix = format!("{path}/");
        let children: Vec<String> = inner
            .nodes
            .keys()
            .filter_map(|p| {
                let rest = p.strip_prefix(&prefix)?;
                if rest.is_empty() || rest.contains('/') {
                    None
                } else {
                    Some(rest.to_string())
                }
            })
            .collect();
        if watch {
            inner.watches.push((path.to_string(), WatchKind::Children));
        }
        Ok(children)
    }

    async fn set_acl(
        &self,
        path: &str,
        acl: Vec<AclEntry>,
        version: Option<i32>,
    ) -> Result<(), CoordinationError> {
        self.check_fault()?;
        let mut inner = self.inner.lock();
        let node = inner
            .nodes
            .get_mut(path)
            .ok_or_else(|| CoordinationError::NoNode(path.to_string()))?;
        if let Some(v) = version {
            if node.version != v {
                return Err(CoordinationError::BadVersion {
                    path: path.to_string(),
                });
            }
        }
        if !self.is_authorized(&node.acl, Perms::ADMIN) {
            return Err(CoordinationError::NoAuth);
        }
        node.acl = acl;
        Ok(())
    }

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
        let auth = String::from_utf8_lossy(&auth).to_string();
        let (user, _) = auth.split_once(':').unwrap_or((auth.as_str(), ""));
        self.my_credentials
            .lock()
            .push((user.to_string(), scheme.to_string()));
        self.inner
            .lock()
            .credentials
            .push((user.to_string(), scheme.to_string()));
        Ok(())
    }

    async fn sync(&self, _path: &str) -> Result<(), CoordinationError> {
        self.check_fault()
    }

    /// Nothing to tear down for an in-memory namespace; this just re-checks
    /// the injected fault so tests simulating a dead ensemble still see
    /// `reconnect` fail the way a real client would.
    async fn reconnect(&self) -> Result<(), CoordinationError> {
        self.check_fault()
    }

    fn watch_events(&self) -> broadcast::Receiver<WatchEvent> {
        self.watch_tx.subscribe()
    }

    async fn close(&self) -> Result<(), CoordinationError> {
        Ok(())
    }
}

fn parent_of(path: &str) -> Option<String> {
    let idx = path.rfind('/')?;
    Some(path[..idx].to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn create_then_get_roundtrips() {
        let client = FakeCoordinationClient::new();
        client
            .create("/a", b"hi".to_vec(), vec![AclEntry::world_all()], CreateMode::Persistent)
            .await
            .unwrap();
        let (data, _stat) = client.get_data("/a", false).await.unwrap();
        assert_eq!(data, b"hi");
    }

    #[tokio::test]
    async fn create_on_existing_path_conflicts() {
        let client = FakeCoordinationClient::new();
        client
            .create("/a", vec![], vec![AclEntry::world_all()], CreateMode::Persistent)
            .await
            .unwrap();
        let err = client
            .create("/a", vec![], vec![AclEntry::world_all()], CreateMode::Persistent)
            .await
            .unwrap_err();
        assert!(matches!(err, CoordinationError::NodeExists(_)));
    }

    #[tokio::test]
    async fn create_with_empty_acl_is_rejected() {
        let client = FakeCoordinationClient::new();
        let err = client
            .create("/a", vec![], vec![], CreateMode::Persistent)
            .await
            .unwrap_err();
        assert_eq!(err, CoordinationError::InvalidAcl);
    }

    #[tokio::test]
    async fn restricted_acl_blocks_unauthenticated_writer() {
        let client = FakeCoordinationClient::new();
        client
            .create(
                "/locked",
                vec![],
                vec![AclEntry::digest("owner:hash", Perms::ALL)],
                CreateMode::Persistent,
            )
            .await
            .unwrap();
        let other = client.fork_session();
        let err = other
            .set_data("/locked", b"x".to_vec(), None)
            .await
            .unwrap_err();
        assert_eq!(err, CoordinationError::NoAuth);
    }

    #[tokio::test]
    async fn injected_fault_surfaces_on_next_call() {
        let client = FakeCoordinationClient::new();
        client.inject_fault(Some(CoordinationError::ConnectionLoss));
        let err = client.exists("/a", false).await.unwrap_err();
        assert_eq!(err, CoordinationError::ConnectionLoss);
    }

    #[tokio::test]
    async fn watched_create_fires_exists_watch() {
        let client = FakeCoordinationClient::new();
        let mut events = client.watch_events();
        client.exists("/a", true).await.unwrap();
        client
            .create("/a", vec![], vec![AclEntry::world_all()], CreateMode::Persistent)
            .await
            .unwrap();
        let event = events.recv().await.unwrap();
        assert_eq!(event.path, "/a");
        assert_eq!(event.event_type, WatchEventType::NodeCreated);
    }
}
