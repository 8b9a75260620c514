// src/core/errors.rs

//! Defines the primary error type for the store and the coordination-layer
//! error codes the retry engine classifies over.

use std::sync::Arc;
use thiserror::Error;

/// Error codes surfaced by the coordination backend, independent of which
/// concrete client implementation produced them. `core::client` implementations
/// translate their backend-specific error types into this enum at the edge so
/// everything above it (`retry`, `fencing`, `recovery`) only ever matches on
/// this set.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CoordinationError {
    #[error("connection loss")]
    ConnectionLoss,

    #[error("operation timeout")]
    OperationTimeout,

    #[error("session expired")]
    SessionExpired,

    #[error("session moved")]
    SessionMoved,

    #[error("node already exists: {0}")]
    NodeExists(String),

    #[error("no node: {0}")]
    NoNode(String),

    #[error("not empty: {0}")]
    NotEmpty(String),

    #[error("bad version for {path}")]
    BadVersion { path: String },

    #[error("not authenticated")]
    NoAuth,

    #[error("invalid ACL")]
    InvalidAcl,

    #[error("coordination backend error: {0}")]
    Other(String),
}

/// The main error enum for the state store.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(Arc<std::io::Error>),

    #[error("coordination error: {0}")]
    Coordination(#[from] CoordinationError),

    #[error("store is fenced as of epoch {epoch}")]
    Fenced { epoch: u64 },

    #[error("record encoding error: {0}")]
    Codec(String),

    #[error("record of {size} bytes exceeds the {limit} byte znode size limit at {path}")]
    RecordTooLarge {
        path: String,
        size: usize,
        limit: usize,
    },

    #[error("retry budget of {attempts} attempts exhausted for {operation}")]
    RetriesExhausted { operation: String, attempts: u32 },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("not started")]
    NotStarted,

    #[error("application not found: {0}")]
    ApplicationNotFound(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl Clone for StoreError {
    fn clone(&self) -> Self {
        match self {
            StoreError::Io(e) => StoreError::Io(Arc::clone(e)),
            StoreError::Coordination(e) => StoreError::Coordination(e.clone()),
            StoreError::Fenced { epoch } => StoreError::Fenced { epoch: *epoch },
            StoreError::Codec(s) => StoreError::Codec(s.clone()),
            StoreError::RecordTooLarge { path, size, limit } => StoreError::RecordTooLarge {
                path: path.clone(),
                size: *size,
                limit: *limit,
            },
            StoreError::RetriesExhausted { operation, attempts } => StoreError::RetriesExhausted {
                operation: operation.clone(),
                attempts: *attempts,
            },
            StoreError::InvalidConfig(s) => StoreError::InvalidConfig(s.clone()),
            StoreError::NotStarted => StoreError::NotStarted,
            StoreError::ApplicationNotFound(s) => StoreError::ApplicationNotFound(s.clone()),
            StoreError::Internal(s) => StoreError::Internal(s.clone()),
        }
    }
}

impl PartialEq for StoreError {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (StoreError::Io(e1), StoreError::Io(e2)) => e1.to_string() == e2.to_string(),
            (StoreError::Coordination(e1), StoreError::Coordination(e2)) => e1 == e2,
            (StoreError::Fenced { epoch: e1 }, StoreError::Fenced { epoch: e2 }) => e1 == e2,
            (StoreError::Codec(s1), StoreError::Codec(s2)) => s1 == s2,
            (
                StoreError::RecordTooLarge {
                    path: p1,
                    size: s1,
                    limit: l1,
                },
                StoreError::RecordTooLarge {
                    path: p2,
                    size: s2,
                    limit: l2,
                },
            ) => p1 == p2 && s1 == s2 && l1 == l2,
            (
                StoreError::RetriesExhausted {
                    operation: o1,
                    attempts: a1,
                },
                StoreError::RetriesExhausted {
                    operation: o2,
                    attempts: a2,
                },
            ) => o1 == o2 && a1 == a2,
            (StoreError::InvalidConfig(s1), StoreError::InvalidConfig(s2)) => s1 == s2,
            (StoreError::NotStarted, StoreError::NotStarted) => true,
            (StoreError::ApplicationNotFound(s1), StoreError::ApplicationNotFound(s2)) => {
                s1 == s2
            }
            (StoreError::Internal(s1), StoreError::Internal(s2)) => s1 == s2,
            _ => false,
        }
    }
}

impl From<std::io::Error> for StoreError {
    fn from(e: std::io::Error) -> Self {
        StoreError::Io(Arc::new(e))
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Codec(e.to_string())
    }
}

impl From<bincode::error::EncodeError> for StoreError {
    fn from(e: bincode::error::EncodeError) -> Self {
        StoreError::Codec(e.to_string())
    }
}

impl From<bincode::error::DecodeError> for StoreError {
    fn from(e: bincode::error::DecodeError) -> Self {
        StoreError::Codec(e.to_string())
    }
}
