// src/core/layout/codec.rs

//! The contract between opaque Rust records and the byte blobs ZooKeeper
//! stores at each znode, plus the default codec implementation.

use crate::core::errors::StoreError;
use serde::{de::DeserializeOwned, Serialize};

/// What to do when a record would encode larger than the configured znode
/// size limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OversizeBlobPolicy {
    /// Silently skip the write and log a warning, matching the original
    /// store's default behavior of tolerating oversize application state
    /// rather than failing recovery for it.
    Drop,
    /// Fail the call with `StoreError::RecordTooLarge`.
    Reject,
}

impl Default for OversizeBlobPolicy {
    fn default() -> Self {
        OversizeBlobPolicy::Drop
    }
}

/// Encodes and decodes the opaque records this store persists. Decoding must
/// be forward-tolerant: fields unknown to this version of the struct are
/// ignored rather than rejected, so a newer writer's blob remains readable by
/// an older reader during a rolling upgrade.
pub trait RecordCodec<T> {
    fn encode(&self, record: &T) -> Result<Vec<u8>, StoreError>;
    fn decode(&self, bytes: &[u8]) -> Result<T, StoreError>;
}

/// Default codec backed by `bincode`, used wherever callers don't need
/// byte-for-byte compatibility with a pre-existing encoding.
#[derive(Debug, Clone, Copy, Default)]
pub struct BincodeRecordCodec;

impl<T> RecordCodec<T> for BincodeRecordCodec
where
    T: Serialize + DeserializeOwned,
{
    fn encode(&self, record: &T) -> Result<Vec<u8>, StoreError> {
        let bytes = bincode::serde::encode_to_vec(record, bincode::config::standard())?;
        Ok(bytes)
    }

    fn decode(&self, bytes: &[u8]) -> Result<T, StoreError> {
        let (record, _) =
            bincode::serde::decode_from_slice(bytes, bincode::config::standard())?;
        Ok(record)
    }
}

/// Checks `bytes` against `limit`, applying `policy` on overflow. Returns
/// `Ok(true)` when the write should proceed, `Ok(false)` when it should be
/// silently dropped under `OversizeBlobPolicy::Drop`.
pub fn check_size(
    path: &str,
    bytes: &[u8],
    limit: usize,
    policy: OversizeBlobPolicy,
) -> Result<bool, StoreError> {
    if bytes.len() <= limit {
        return Ok(true);
    }
    match policy {
        OversizeBlobPolicy::Drop => {
            tracing::warn!(
                path,
                size = bytes.len(),
                limit,
                "record exceeds znode size limit, dropping write"
            );
            Ok(false)
        }
        OversizeBlobPolicy::Reject => Err(StoreError::RecordTooLarge {
            path: path.to_string(),
            size: bytes.len(),
            limit,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Sample {
        a: u32,
        #[serde(default)]
        b: Option<String>,
    }

    #[test]
    fn roundtrips_through_bincode_codec() {
        let codec = BincodeRecordCodec;
        let sample = Sample {
            a: 7,
            b: Some("x".into()),
        };
        let bytes = codec.encode(&sample).unwrap();
        let decoded: Sample = codec.decode(&bytes).unwrap();
        assert_eq!(sample, decoded);
    }

    #[test]
    fn drop_policy_skips_oversize_write() {
        let result = check_size("/p", &[0u8; 10], 4, OversizeBlobPolicy::Drop).unwrap();
        assert!(!result);
    }

    #[test]
    fn reject_policy_errors_on_oversize_write() {
        let err = check_size("/p", &[0u8; 10], 4, OversizeBlobPolicy::Reject).unwrap_err();
        assert!(matches!(err, StoreError::RecordTooLarge { .. }));
    }
}
