//! Per-identity activation leases.
//! Every activation holds a lease keyed by identity with a TTL at least the
//! heartbeat interval; the lease epoch doubles as a fencing token. Acquiring
//! and renewing a lease is a single CAS against the sled tree so two nodes
//! racing to activate the same identity can never both succeed.

use serde::{Deserialize, Serialize};
use titan_primitives::{Identity, Timestamp};

use crate::membership::MembershipError;
use crate::node::NodeId;

#[derive(Clone, Serialize, Deserialize, Debug)]
pub struct Lease {
    pub node_id: NodeId,
    pub epoch: u64,
    pub expires_at: Timestamp,
}

pub struct LeaseStore {
    tree: sled::Tree,
}

#[derive(thiserror::Error, Debug)]
pub enum LeaseError {
    #[error("sled error: {0}")]
    Sled(#[from] sled::Error),
    #[error("decode error: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("identity {0} is already leased by another node")]
    HeldElsewhere(Identity),
}

impl From<LeaseError> for titan_primitives::TitanError {
    fn from(e: LeaseError) -> Self {
        match e {
            LeaseError::HeldElsewhere(_) => titan_primitives::TitanError::conflict(e.to_string()),
            other => titan_primitives::TitanError::transient(other.to_string()),
        }
    }
}

impl LeaseStore {
    pub fn open(db: &sled::Db) -> Result<Self, MembershipError> {
        Ok(Self { tree: db.open_tree("leases")? })
    }

    fn current(&self, key: &[u8]) -> Result<Option<Lease>, LeaseError> {
        match self.tree.get(key)? {
            Some(raw) => Ok(Some(serde_json::from_slice(&raw)?)),
            None => Ok(None),
        }
    }

    /// Acquires a fresh lease for `identity` on `node_id`, failing with
    /// `HeldElsewhere` if a live (non-expired) lease is held by a different
    /// node. Returns the new epoch (monotonically increasing per identity).
    pub fn acquire(&self, identity: &Identity, node_id: &NodeId, ttl: std::time::Duration) -> Result<u64, LeaseError> {
        let key = identity.to_bytes();
        loop {
            let existing_raw = self.tree.get(&key)?;
            let (old_raw, next_epoch) = match &existing_raw {
                Some(raw) => {
                    let lease: Lease = serde_json::from_slice(raw)?;
                    if !lease.expires_at.is_past() && lease.node_id != *node_id {
                        return Err(LeaseError::HeldElsewhere(identity.clone()));
                    }
                    (Some(raw.to_vec()), lease.epoch + 1)
                }
                None => (None, 0),
            };
            let new_lease = Lease {
                node_id: node_id.clone(),
                epoch: next_epoch,
                expires_at: Timestamp::now() + ttl,
            };
            let new_raw = serde_json::to_vec(&new_lease)?;
            match self.tree.compare_and_swap(&key, old_raw, Some(new_raw))? {
                Ok(()) => return Ok(next_epoch),
                Err(_) => continue, // lost the race; retry with fresh state
            }
        }
    }

    /// Renews a lease this node already holds at the given epoch. Fails if
    /// the lease was reassigned (epoch mismatch) — the caller must stop
    /// serving the identity and passivate.
    pub fn renew(
        &self,
        identity: &Identity,
        node_id: &NodeId,
        epoch: u64,
        ttl: std::time::Duration,
    ) -> Result<(), LeaseError> {
        let key = identity.to_bytes();
        let current = self
            .current(&key)?
            .ok_or_else(|| LeaseError::HeldElsewhere(identity.clone()))?;
        if current.node_id != *node_id || current.epoch != epoch {
            return Err(LeaseError::HeldElsewhere(identity.clone()));
        }
        let old_raw = serde_json::to_vec(&current)?;
        let new_lease = Lease { expires_at: Timestamp::now() + ttl, ..current };
        let new_raw = serde_json::to_vec(&new_lease)?;
        match self.tree.compare_and_swap(&key, Some(old_raw), Some(new_raw))? {
            Ok(()) => Ok(()),
            Err(_) => Err(LeaseError::HeldElsewhere(identity.clone())),
        }
    }

    pub fn release(&self, identity: &Identity) -> Result<(), LeaseError> {
        self.tree.remove(identity.to_bytes())?;
        Ok(())
    }

    pub fn evict(&self, identity: &Identity) -> Result<(), LeaseError> {
        self.release(identity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use titan_primitives::{CellKind, Key};

    fn store() -> LeaseStore {
        let dir = tempfile::tempdir().unwrap();
        let db = sled::open(dir.path()).unwrap();
        std::mem::forget(dir);
        LeaseStore::open(&db).unwrap()
    }

    fn id() -> Identity {
        Identity::new(CellKind::from("Trade"), Key::string("t1"))
    }

    #[test]
    fn second_node_cannot_acquire_live_lease() {
        let s = store();
        let a = NodeId::new();
        let b = NodeId::new();
        s.acquire(&id(), &a, std::time::Duration::from_secs(30)).unwrap();
        let err = s.acquire(&id(), &b, std::time::Duration::from_secs(30)).unwrap_err();
        assert!(matches!(err, LeaseError::HeldElsewhere(_)));
    }

    #[test]
    fn expired_lease_can_be_reacquired_by_another_node() {
        let s = store();
        let a = NodeId::new();
        let b = NodeId::new();
        s.acquire(&id(), &a, std::time::Duration::from_millis(0)).unwrap();
        std::thread::sleep(std::time::Duration::from_millis(5));
        let epoch = s.acquire(&id(), &b, std::time::Duration::from_secs(30)).unwrap();
        assert_eq!(epoch, 1);
    }

    #[test]
    fn renew_fails_after_reassignment() {
        let s = store();
        let a = NodeId::new();
        let epoch = s.acquire(&id(), &a, std::time::Duration::from_millis(0)).unwrap();
        std::thread::sleep(std::time::Duration::from_millis(5));
        let b = NodeId::new();
        s.acquire(&id(), &b, std::time::Duration::from_secs(30)).unwrap();
        let err = s.renew(&id(), &a, epoch, std::time::Duration::from_secs(30)).unwrap_err();
        assert!(matches!(err, LeaseError::HeldElsewhere(_)));
    }
}
