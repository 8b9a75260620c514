// src/core/recovery/types.rs

//! Opaque records persisted under the state tree. Every field is optional or
//! defaulted so a newer writer's record stays decodable by an older reader
//! during a rolling upgrade (see `core::layout::codec`).

use serde::{Deserialize, Serialize};

/// Application-level state: the record stored at
/// `RMAppRoot/<app-id>`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ApplicationState {
    pub app_id: String,
    pub submit_time: i64,
    pub start_time: i64,
    pub user: String,
    #[serde(default)]
    pub application_context_blob: Vec<u8>,
    #[serde(default)]
    pub attempt_ids: Vec<String>,
}

/// Per-attempt state: the record stored at
/// `RMAppRoot/<app-id>/<attempt-id>`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ApplicationAttemptState {
    pub attempt_id: String,
    #[serde(default)]
    pub master_container_blob: Vec<u8>,
    #[serde(default)]
    pub app_attempt_tokens: Vec<u8>,
    #[serde(default)]
    pub start_time: i64,
    #[serde(default)]
    pub finish_state: Option<String>,
    #[serde(default)]
    pub final_tracking_url: Option<String>,
    #[serde(default)]
    pub diagnostics: String,
    #[serde(default)]
    pub finish_time: i64,
    #[serde(default)]
    pub ranked_exit_status: i32,
}

/// A delegation-token master key, stored under `DelegationKey_<key-id>`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DelegationKey {
    pub key_id: i32,
    pub expiry_date: i64,
    #[serde(default)]
    pub key_bytes: Vec<u8>,
}

/// A delegation token record, stored under `RMDelegationToken_<sequence>`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DelegationTokenRecord {
    pub sequence_number: i32,
    pub token_identifier_blob: Vec<u8>,
    pub renew_date: i64,
}

/// AMRM token secret manager state, stored as a single record under
/// `AMRMTokenSecretManagerRoot`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct AmrmTokenSecretManagerState {
    #[serde(default)]
    pub current_master_key: Option<Vec<u8>>,
    #[serde(default)]
    pub next_master_key: Option<Vec<u8>>,
}

/// The schema version stamped into `RMVersionNode`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Version {
    pub major: u32,
    pub minor: u32,
}

/// A snapshot of everything `load_state` reads back on recovery.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RmState {
    pub applications: Vec<(ApplicationState, Vec<ApplicationAttemptState>)>,
    pub delegation_keys: Vec<DelegationKey>,
    pub delegation_tokens: Vec<DelegationTokenRecord>,
    pub amrm_token_state: Option<AmrmTokenSecretManagerState>,
    pub dt_sequence_number: i32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn application_state_roundtrips_through_json() {
        let state = ApplicationState {
            app_id: "app_1".into(),
            submit_time: 1,
            start_time: 2,
            user: "alice".into(),
            application_context_blob: vec![1, 2, 3],
            attempt_ids: vec!["attempt_1".into()],
        };
        let bytes = serde_json::to_vec(&state).unwrap();
        let decoded: ApplicationState = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(state, decoded);
    }
}
