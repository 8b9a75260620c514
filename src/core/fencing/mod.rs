// src/core/fencing/mod.rs

//! Fencing discipline (C3): root ACL rewrite, the fenced-multi wrapper
//! around every mutation, and the background liveness prober.

pub mod acl;
pub mod prober;

pub use acl::{DigestCredential, FencingMode};

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::core::client::{AclEntry, CoordinationClient, CreateMode, MultiOp, Perms};
use crate::core::errors::{CoordinationError, StoreError};
use crate::core::layout::paths::Layout;

/// Owns the fencing credential (if self-managed) and wraps every mutation in
/// `create(lock) -> ops -> delete(lock)`, so a fenced-out controller's stale
/// writes always lose the race for the lock znode to the active controller.
pub struct FencingGuard {
    layout: Layout,
    mode: FencingMode,
    /// Set once this guard has successfully rewritten the root ACL (or, in
    /// explicit-ACL mode, once it has verified it can write under the root).
    fenced_in: AtomicBool,
}

impl FencingGuard {
    pub fn new(layout: Layout, mode: FencingMode) -> Self {
        Self {
            layout,
            mode,
            fenced_in: AtomicBool::new(false),
        }
    }

    pub fn is_fenced_in(&self) -> bool {
        self.fenced_in.load(Ordering::SeqCst)
    }

    /// Establishes exclusivity: rewrites the root ACL to grant `CREATE` and
    /// `DELETE` to a freshly generated digest credential (self-managed mode)
    /// or leaves the operator-supplied ACL untouched (explicit mode), then
    /// registers that credential on the current session.
    pub async fn establish(
        &self,
        client: &dyn CoordinationClient,
        principals: &[AclEntry],
    ) -> Result<(), StoreError> {
        match &self.mode {
            FencingMode::SelfManaged => {
                let credential = DigestCredential::generate("rmstore-controller");
                let digest_id = credential.digest_id();
                client
                    .add_auth("digest", format!("{}:{}", credential.user, credential.password).into_bytes())
                    .await?;

                let mut acl: Vec<AclEntry> = principals
                    .iter()
                    .map(|p| AclEntry {
                        scheme: p.scheme.clone(),
                        id: p.id.clone(),
                        perms: (p.perms - Perms::CREATE) - Perms::DELETE,
                    })
                    .collect();
                acl.push(AclEntry::digest(&digest_id, Perms::CREATE | Perms::DELETE));

                client
                    .set_acl(&self.layout.state_root(), acl, None)
                    .await?;
            }
            FencingMode::ExplicitAcl(_) => {
                // ACL is operator-managed; nothing to rewrite, just confirm the
                // lock path is reachable under the current credentials.
                client.exists(&self.layout.fencing_lock(), false).await?;
            }
        }
        self.fenced_in.store(true, Ordering::SeqCst);
        Ok(())
    }

    /// Wraps `ops` in `create(lock) / ops / delete(lock)` so that, under
    /// contention, only the controller holding write access to the root can
    /// complete a mutation: a fenced-out controller's `create(lock)` fails
    /// with `NoAuth`, which the retry engine maps to `StoreError::Fenced`.
    pub async fn fenced_multi(
        &self,
        client: &dyn CoordinationClient,
        mut ops: Vec<MultiOp>,
    ) -> Result<(), CoordinationError> {
        let lock_path = self.layout.fencing_lock();
        let mut full_ops = Vec::with_capacity(ops.len() + 2);
        full_ops.push(MultiOp::Create {
            path: lock_path.clone(),
            data: Vec::new(),
            // The lock node's own ACL doesn't need CREATE/DELETE rights —
            // that exclusivity comes from the root's ACL rewritten by
            // `establish`. It just needs to be non-empty: ZooKeeper rejects
            // an empty ACL list on `create` outright.
            acl: vec![AclEntry {
                scheme: "world".into(),
                id: "anyone".into(),
                perms: Perms::READ,
            }],
            mode: CreateMode::Ephemeral,
        });
        full_ops.append(&mut ops);
        full_ops.push(MultiOp::Delete {
            path: lock_path,
            version: None,
        });
        client.multi(full_ops).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::client::fake::FakeCoordinationClient;

    #[tokio::test]
    async fn establish_grants_only_digest_principal_create_delete() {
        let layout = Layout::new("/rmstore");
        let client = FakeCoordinationClient::new();
        client
            .create(
                &layout.state_root(),
                vec![],
                vec![AclEntry::world_all()],
                CreateMode::Persistent,
            )
            .await
            .unwrap();
        let guard = FencingGuard::new(layout.clone(), FencingMode::SelfManaged);
        guard
            .establish(&client, &[AclEntry::world_all()])
            .await
            .unwrap();
        assert!(guard.is_fenced_in());
    }

    #[tokio::test]
    async fn fenced_multi_wraps_ops_in_lock_create_delete() {
        let layout = Layout::new("/rmstore");
        let client = FakeCoordinationClient::new();
        client
            .create(
                &layout.state_root(),
                vec![],
                vec![AclEntry::world_all()],
                CreateMode::Persistent,
            )
            .await
            .unwrap();
        let guard = FencingGuard::new(layout.clone(), FencingMode::SelfManaged);
        guard.fenced_multi(&client, vec![]).await.unwrap();
        // the lock is created then deleted by the wrapper, so it should not
        // remain afterward.
        assert!(client
            .exists(&layout.fencing_lock(), false)
            .await
            .unwrap()
            .is_none());
    }
}
