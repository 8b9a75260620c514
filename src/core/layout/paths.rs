// src/core/layout/paths.rs

//! Every znode path this crate ever constructs lives here, so no other
//! module builds a path by hand.

/// Default parent path for the whole state tree, overridable via config.
pub const DEFAULT_STATE_STORE_PARENT: &str = "/rmstore";

pub const RM_STATE_ROOT: &str = "ZKRMStateRoot";
pub const VERSION_NODE: &str = "RMVersionNode";
pub const EPOCH_NODE: &str = "EpochNode";
pub const FENCING_LOCK: &str = "RM_ZK_FENCING_LOCK";
pub const RM_APP_ROOT: &str = "RMAppRoot";
pub const RM_DT_SECRET_MANAGER_ROOT: &str = "RMDTSecretManagerRoot";
pub const RM_DT_SEQUENTIAL_NUMBER: &str = "RMDTSequentialNumber";
pub const RM_DT_MASTER_KEYS_ROOT: &str = "RMDTMasterKeysRoot";
pub const AMRM_TOKEN_SECRET_MANAGER_ROOT: &str = "AMRMTokenSecretManagerRoot";

const DELEGATION_KEY_PREFIX: &str = "DelegationKey_";
const DELEGATION_TOKEN_PREFIX: &str = "RMDelegationToken_";

/// Builds the fixed skeleton of paths rooted at `parent`, e.g. `/rmstore`.
#[derive(Debug, Clone)]
pub struct Layout {
    parent: String,
}

impl Layout {
    pub fn new(parent: impl Into<String>) -> Self {
        let mut parent = parent.into();
        if parent.ends_with('/') && parent.len() > 1 {
            parent.pop();
        }
        Self { parent }
    }

    pub fn parent(&self) -> &str {
        &self.parent
    }

    pub fn state_root(&self) -> String {
        format!("{}/{}", self.parent, RM_STATE_ROOT)
    }

    pub fn version_node(&self) -> String {
        format!("{}/{}", self.state_root(), VERSION_NODE)
    }

    pub fn epoch_node(&self) -> String {
        format!("{}/{}", self.state_root(), EPOCH_NODE)
    }

    pub fn fencing_lock(&self) -> String {
        format!("{}/{}", self.state_root(), FENCING_LOCK)
    }

    pub fn app_root(&self) -> String {
        format!("{}/{}", self.state_root(), RM_APP_ROOT)
    }

    pub fn app_node(&self, app_id: &str) -> String {
        format!("{}/{}", self.app_root(), app_id)
    }

    pub fn app_attempt_node(&self, app_id: &str, attempt_id: &str) -> String {
        format!("{}/{}", self.app_node(app_id), attempt_id)
    }

    pub fn secret_manager_root(&self) -> String {
        format!("{}/{}", self.state_root(), RM_DT_SECRET_MANAGER_ROOT)
    }

    pub fn dt_sequential_number_node(&self) -> String {
        format!("{}/{}", self.secret_manager_root(), RM_DT_SEQUENTIAL_NUMBER)
    }

    pub fn dt_master_keys_root(&self) -> String {
        format!("{}/{}", self.secret_manager_root(), RM_DT_MASTER_KEYS_ROOT)
    }

    pub fn dt_master_key_node(&self, key_id: i32) -> String {
        format!(
            "{}/{DELEGATION_KEY_PREFIX}{key_id}",
            self.dt_master_keys_root()
        )
    }

    pub fn delegation_token_node(&self, sequence_number: i32) -> String {
        format!(
            "{}/{DELEGATION_TOKEN_PREFIX}{sequence_number}",
            self.secret_manager_root()
        )
    }

    pub fn amrm_token_secret_manager_root(&self) -> String {
        format!("{}/{}", self.state_root(), AMRM_TOKEN_SECRET_MANAGER_ROOT)
    }

    /// The handful of persistent container znodes created eagerly by `start()`.
    pub fn containers(&self) -> Vec<String> {
        vec![
            self.state_root(),
            self.app_root(),
            self.secret_manager_root(),
            self.dt_master_keys_root(),
            self.amrm_token_secret_manager_root(),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_trailing_slash() {
        let layout = Layout::new("/rmstore/");
        assert_eq!(layout.parent(), "/rmstore");
        assert_eq!(layout.state_root(), "/rmstore/ZKRMStateRoot");
    }

    #[test]
    fn app_attempt_nests_under_app() {
        let layout = Layout::new("/rmstore");
        assert_eq!(
            layout.app_attempt_node("app_1", "attempt_1"),
            "/rmstore/ZKRMStateRoot/RMAppRoot/app_1/attempt_1"
        );
    }

    #[test]
    fn delegation_token_node_uses_sequence_number() {
        let layout = Layout::new("/rmstore");
        assert_eq!(
            layout.delegation_token_node(42),
            "/rmstore/ZKRMStateRoot/RMDTSecretManagerRoot/RMDelegationToken_42"
        );
    }
}
