// src/core/layout/mod.rs

//! Hierarchical znode layout and the codec glue between opaque Rust records
//! and the byte blobs stored at each path.

pub mod codec;
pub mod paths;

pub use codec::{BincodeRecordCodec, OversizeBlobPolicy, RecordCodec};
