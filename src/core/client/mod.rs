// src/core/client/mod.rs

//! The coordination client wrapper (C1): a small async trait abstracting over
//! the backing coordination service, plus the concrete ZooKeeper-backed
//! implementation and session bookkeeping shared with the retry engine.

pub mod fake;
pub mod session;
pub mod zk;

pub use session::{SessionHandle, SessionState};
pub use zk::ZkCoordinationClient;

use crate::core::errors::CoordinationError;
use async_trait::async_trait;

/// A single ACL entry: `scheme:id` granted `perms`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AclEntry {
    pub scheme: String,
    pub id: String,
    pub perms: Perms,
}

bitflags::bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Perms: u32 {
        const READ   = 0b0000_0001;
        const WRITE  = 0b0000_0010;
        const CREATE = 0b0000_0100;
        const DELETE = 0b0000_1000;
        const ADMIN  = 0b0001_0000;
        const ALL = Self::READ.bits() | Self::WRITE.bits() | Self::CREATE.bits()
            | Self::DELETE.bits() | Self::ADMIN.bits();
    }
}

impl AclEntry {
    pub fn world_all() -> Self {
        AclEntry {
            scheme: "world".into(),
            id: "anyone".into(),
            perms: Perms::ALL,
        }
    }

    pub fn digest(id: &str, perms: Perms) -> Self {
        AclEntry {
            scheme: "digest".into(),
            id: id.to_string(),
            perms,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateMode {
    Persistent,
    Ephemeral,
}

/// Metadata ZooKeeper returns alongside node data, trimmed to the fields the
/// retry and recovery logic actually consult.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Stat {
    pub version: i32,
    pub czxid: i64,
}

/// A single dispatched watch firing, delivered on the channel returned by
/// `CoordinationClient::watch_events`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchEvent {
    pub path: String,
    pub event_type: WatchEventType,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchEventType {
    NodeCreated,
    NodeDeleted,
    NodeDataChanged,
    NodeChildrenChanged,
}

/// A single step of an atomic multi-operation.
#[derive(Debug, Clone)]
pub enum MultiOp {
    Create {
        path: String,
        data: Vec<u8>,
        acl: Vec<AclEntry>,
        mode: CreateMode,
    },
    Delete {
        path: String,
        version: Option<i32>,
    },
    SetData {
        path: String,
        data: Vec<u8>,
        version: Option<i32>,
    },
    Check {
        path: String,
        version: i32,
    },
}

/// Coordination-service operations needed above this layer. Implementations
/// translate their backend's error type into `CoordinationError` at this
/// boundary so the retry engine (`core::retry`) only ever classifies over
/// this one error enum.
#[async_trait]
pub trait CoordinationClient: Send + Sync {
    async fn create(
        &self,
        path: &str,
        data: Vec<u8>,
        acl: Vec<AclEntry>,
        mode: CreateMode,
    ) -> Result<String, CoordinationError>;

    async fn delete(&self, path: &str, version: Option<i32>) -> Result<(), CoordinationError>;

    /// `watch` re-registers a one-shot watch on `path` with the backend's
    /// default dispatcher; its firing surfaces on `watch_events`.
    async fn exists(&self, path: &str, watch: bool) -> Result<Option<Stat>, CoordinationError>;

    async fn get_data(&self, path: &str, watch: bool) -> Result<(Vec<u8>, Stat), CoordinationError>;

    async fn set_data(
        &self,
        path: &str,
        data: Vec<u8>,
        version: Option<i32>,
    ) -> Result<Stat, CoordinationError>;

    async fn get_children(&self, path: &str, watch: bool) -> Result<Vec<String>, CoordinationError>;

    async fn set_acl(
        &self,
        path: &str,
        acl: Vec<AclEntry>,
        version: Option<i32>,
    ) -> Result<(), CoordinationError>;

    /// Applies every op or none of them. Implementations that cannot express
    /// true server-side multi-transactions MUST still apply ops in order and
    /// stop at the first failure; true atomicity then rests on the fencing
    /// lock discipline in `core::fencing` rather than the backend.
    async fn multi(&self, ops: Vec<MultiOp>) -> Result<(), CoordinationError>;

    /// Registers a digest credential on the current session.
    async fn add_auth(&self, scheme: &str, auth: Vec<u8>) -> Result<(), CoordinationError>;

    /// Flushes any pending writes/reads ordering before the next read,
    /// forcing read-your-writes after a reconnect.
    async fn sync(&self, path: &str) -> Result<(), CoordinationError>;

    /// Drops the current session, if any, and establishes a fresh one against
    /// the same backend, called by the retry engine on
    /// `SessionExpired`/`SessionMoved` before it retries the failed op.
    async fn reconnect(&self) -> Result<(), CoordinationError>;

    /// The single dispatcher every one-shot watch registered via `exists`,
    /// `get_data`, or `get_children` fires on.
    fn watch_events(&self) -> tokio::sync::broadcast::Receiver<WatchEvent>;

    /// Tears down the session entirely, e.g. at shutdown.
    async fn close(&self) -> Result<(), CoordinationError>;
}

/// Creates `path` as an empty persistent container if it does not already
/// exist, treating `NodeExists` as success — the idempotent-creation idiom
/// used throughout this crate's bootstrap path.
pub async fn ensure_container(
    client: &dyn CoordinationClient,
    path: &str,
    acl: Vec<AclEntry>,
) -> Result<(), CoordinationError> {
    match client
        .create(path, Vec::new(), acl, CreateMode::Persistent)
        .await
    {
        Ok(_) => Ok(()),
        Err(CoordinationError::NodeExists(_)) => Ok(()),
        Err(e) => Err(e),
    }
}
