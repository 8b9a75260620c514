// src/config.rs

//! Configuration loading and validation, following the same
//! `fs::read_to_string` + `toml::from_str` + `validate()` shape used
//! throughout this codebase rather than a dedicated config-layer crate.

use std::time::Duration;

use anyhow::{anyhow, Result};
use serde::Deserialize;

use crate::core::client::{AclEntry, Perms};
use crate::core::layout::codec::OversizeBlobPolicy;
use crate::core::layout::paths::DEFAULT_STATE_STORE_PARENT;

fn default_state_store_parent() -> String {
    DEFAULT_STATE_STORE_PARENT.to_string()
}

fn default_num_retries() -> u32 {
    1000
}

fn default_session_timeout() -> Duration {
    Duration::from_millis(10_000)
}

fn default_znode_size_limit() -> usize {
    1024 * 1024
}

fn default_ha_enabled() -> bool {
    false
}

fn default_prober_interval() -> Duration {
    Duration::from_secs(5)
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_oversize_policy() -> OversizeBlobPolicyConfig {
    OversizeBlobPolicyConfig::Drop
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OversizeBlobPolicyConfig {
    Drop,
    Reject,
}

impl From<OversizeBlobPolicyConfig> for OversizeBlobPolicy {
    fn from(value: OversizeBlobPolicyConfig) -> Self {
        match value {
            OversizeBlobPolicyConfig::Drop => OversizeBlobPolicy::Drop,
            OversizeBlobPolicyConfig::Reject => OversizeBlobPolicy::Reject,
        }
    }
}

/// One `scheme:id:perms` principal kept on the root ACL, e.g. the resource
/// manager's own operator identity.
#[derive(Debug, Clone, Deserialize)]
pub struct PrincipalConfig {
    pub scheme: String,
    pub id: String,
    /// Any combination of `r`, `w`, `c`, `d`, `a`.
    pub perms: String,
}

impl PrincipalConfig {
    /// Parses `perms` into an `AclEntry`, granting the root ACL whichever of
    /// read/write/create/delete/admin the operator listed.
    pub fn to_acl_entry(&self) -> Result<AclEntry> {
        let mut perms = Perms::empty();
        for c in self.perms.chars() {
            perms |= match c {
                'r' => Perms::READ,
                'w' => Perms::WRITE,
                'c' => Perms::CREATE,
                'd' => Perms::DELETE,
                'a' => Perms::ADMIN,
                other => {
                    return Err(anyhow!(
                        "unknown ACL permission character '{other}' in principal {}:{}",
                        self.scheme,
                        self.id
                    ))
                }
            };
        }
        Ok(AclEntry {
            scheme: self.scheme.clone(),
            id: self.id.clone(),
            perms,
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ZkConfig {
    pub address: String,

    #[serde(default = "default_num_retries")]
    pub num_retries: u32,

    #[serde(default = "default_session_timeout", with = "humantime_serde")]
    pub session_timeout: Duration,

    #[serde(default, with = "humantime_serde::option")]
    pub retry_interval: Option<Duration>,

    #[serde(default = "default_state_store_parent")]
    pub state_store_parent_path: String,

    #[serde(default = "default_znode_size_limit")]
    pub znode_size_limit_bytes: usize,

    #[serde(default = "default_oversize_policy")]
    pub oversize_blob_policy: OversizeBlobPolicyConfig,

    #[serde(default = "default_ha_enabled")]
    pub ha_enabled: bool,

    /// When set, this crate treats ACL management as the operator's
    /// responsibility and never rewrites the root ACL itself.
    #[serde(default)]
    pub explicit_root_acl: Option<Vec<PrincipalConfig>>,

    #[serde(default)]
    pub root_principals: Vec<PrincipalConfig>,

    #[serde(default = "default_prober_interval", with = "humantime_serde")]
    pub prober_interval: Duration,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    pub zk: ZkConfig,

    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl StoreConfig {
    pub async fn from_file(path: &str) -> Result<Self> {
        let raw = tokio::fs::read_to_string(path).await?;
        let config: StoreConfig = toml::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.zk.address.trim().is_empty() {
            return Err(anyhow!("zk.address must not be empty"));
        }
        if self.zk.num_retries == 0 {
            return Err(anyhow!("zk.num_retries must be greater than zero"));
        }
        if self.zk.session_timeout.is_zero() {
            return Err(anyhow!("zk.session_timeout must be greater than zero"));
        }
        if self.zk.state_store_parent_path.is_empty()
            || !self.zk.state_store_parent_path.starts_with('/')
        {
            return Err(anyhow!(
                "zk.state_store_parent_path must be an absolute znode path"
            ));
        }
        if self.zk.znode_size_limit_bytes == 0 {
            return Err(anyhow!("zk.znode_size_limit_bytes must be greater than zero"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_rejects_empty_address() {
        let config = StoreConfig {
            zk: ZkConfig {
                address: "".into(),
                num_retries: 1000,
                session_timeout: Duration::from_secs(10),
                retry_interval: None,
                state_store_parent_path: "/rmstore".into(),
                znode_size_limit_bytes: 1024,
                oversize_blob_policy: OversizeBlobPolicyConfig::Drop,
                ha_enabled: false,
                explicit_root_acl: None,
                root_principals: vec![],
                prober_interval: Duration::from_secs(5),
            },
            log_level: "info".into(),
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn parses_minimal_toml() {
        let toml_src = r#"
            [zk]
            address = "zk1:2181,zk2:2181"
        "#;
        let config: StoreConfig = toml::from_str(toml_src).unwrap();
        assert_eq!(config.zk.num_retries, 1000);
        assert_eq!(config.zk.state_store_parent_path, "/rmstore");
        config.validate().unwrap();
    }
}
