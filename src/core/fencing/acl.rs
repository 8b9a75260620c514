// src/core/fencing/acl.rs

//! Digest credential generation and the two supported fencing modes.

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use sha1::{Digest, Sha1};

use crate::core::client::AclEntry;

/// How this store establishes exclusive write access to the state tree.
#[derive(Debug, Clone)]
pub enum FencingMode {
    /// This crate generates and registers its own digest credential and
    /// rewrites the root ACL on every `establish()` call.
    SelfManaged,
    /// The operator supplies the root ACL out of band (e.g. provisioned once
    /// by a cluster bootstrap tool); this crate never touches it, but still
    /// runs every mutation through the fenced-multi lock wrapper.
    ExplicitAcl(Vec<AclEntry>),
}

/// A `user:password` pair used to build a ZooKeeper `digest` scheme ACL
/// entry: `id = user:base64(sha1(user:password))`.
#[derive(Debug, Clone)]
pub struct DigestCredential {
    pub user: String,
    pub password: String,
}

impl DigestCredential {
    /// Generates a credential with `user_prefix-<run-id>` as the username and
    /// a random 8-byte hex password, giving every controller instance its
    /// own distinct digest identity.
    pub fn generate(user_prefix: &str) -> Self {
        let mut bytes = [0u8; 8];
        getrandom::fill(&mut bytes).expect("system RNG must be available");
        let run_id = hex::encode(bytes);

        let mut password_bytes = [0u8; 8];
        getrandom::fill(&mut password_bytes).expect("system RNG must be available");
        let password = hex::encode(password_bytes);

        Self {
            user: format!("{user_prefix}-{run_id}"),
            password,
        }
    }

    /// The `scheme:id` digest ACL identity string for this credential.
    pub fn digest_id(&self) -> String {
        let mut hasher = Sha1::new();
        hasher.update(format!("{}:{}", self.user, self.password).as_bytes());
        let digest = hasher.finalize();
        format!("{}:{}", self.user, BASE64.encode(digest))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn digest_id_is_deterministic_for_same_credential() {
        let credential = DigestCredential {
            user: "alice".into(),
            password: "secret".into(),
        };
        assert_eq!(credential.digest_id(), credential.digest_id());
        assert!(credential.digest_id().starts_with("alice:"));
    }

    #[test]
    fn generated_credentials_are_distinct() {
        let a = DigestCredential::generate("rm");
        let b = DigestCredential::generate("rm");
        assert_ne!(a.user, b.user);
        assert_ne!(a.password, b.password);
    }
}
