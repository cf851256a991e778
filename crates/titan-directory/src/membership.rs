//! Membership tracking via periodic heartbeats into the shared KV
//! modeled on the pattern of `control_db.rs` use of `sled`
//! trees as a small durable store with a typed error enum.

use std::time::Duration;

use titan_primitives::TitanError;

use crate::node::{MembershipRecord, NodeId};

#[derive(thiserror::Error, Debug)]
pub enum MembershipError {
    #[error("sled error: {0}")]
    Sled(#[from] sled::Error),
    #[error("decode error: {0}")]
    Decode(#[from] serde_json::Error),
}

impl From<MembershipError> for TitanError {
    fn from(e: MembershipError) -> Self {
        TitanError::transient(e.to_string())
    }
}

pub struct MembershipStore {
    tree: sled::Tree,
}

impl MembershipStore {
    pub fn open(db: &sled::Db) -> Result<Self, MembershipError> {
        Ok(Self { tree: db.open_tree("membership")? })
    }

    pub fn heartbeat(&self, node_id: &NodeId, endpoints: Vec<String>) -> Result<u64, MembershipError> {
        let key = node_id.0.as_bytes().to_vec();
        let existing = self.tree.get(&key)?;
        let incarnation = match existing {
            Some(raw) => {
                let rec: MembershipRecord = serde_json::from_slice(&raw)?;
                rec.incarnation
            }
            None => 0,
        };
        let record = MembershipRecord {
            node_id: node_id.clone(),
            endpoints,
            heartbeat_at: titan_primitives::Timestamp::now(),
            incarnation,
        };
        let bytes = serde_json::to_vec(&record)?;
        self.tree.insert(&key, bytes)?;
        Ok(incarnation)
    }

    /// Bumps the incarnation, used when a node restarts and wants prior
    /// leases fenced out immediately rather than waiting for their TTL.
    pub fn rejoin(&self, node_id: &NodeId, endpoints: Vec<String>) -> Result<u64, MembershipError> {
        let key = node_id.0.as_bytes().to_vec();
        let existing = self.tree.get(&key)?;
        let incarnation = match existing {
            Some(raw) => serde_json::from_slice::<MembershipRecord>(&raw)?.incarnation + 1,
            None => 0,
        };
        let record = MembershipRecord {
            node_id: node_id.clone(),
            endpoints,
            heartbeat_at: titan_primitives::Timestamp::now(),
            incarnation,
        };
        self.tree.insert(&key, serde_json::to_vec(&record)?)?;
        Ok(incarnation)
    }

    pub fn live_nodes(&self, failure_timeout: Duration) -> Result<Vec<MembershipRecord>, MembershipError> {
        let mut out = Vec::new();
        for entry in self.tree.iter() {
            let (_, raw) = entry?;
            let rec: MembershipRecord = serde_json::from_slice(&raw)?;
            if !rec.is_dead(failure_timeout) {
                out.push(rec);
            }
        }
        Ok(out)
    }

    pub fn all_nodes(&self) -> Result<Vec<MembershipRecord>, MembershipError> {
        let mut out = Vec::new();
        for entry in self.tree.iter() {
            let (_, raw) = entry?;
            out.push(serde_json::from_slice(&raw)?);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> MembershipStore {
        let dir = tempfile::tempdir().unwrap();
        let db = sled::open(dir.path()).unwrap();
        std::mem::forget(dir);
        MembershipStore::open(&db).unwrap()
    }

    #[test]
    fn live_nodes_excludes_stale_heartbeats() {
        let s = store();
        let node = NodeId::new();
        s.heartbeat(&node, vec!["127.0.0.1:9000".into()]).unwrap();
        let live = s.live_nodes(Duration::from_secs(30)).unwrap();
        assert_eq!(live.len(), 1);
        let dead = s.live_nodes(Duration::from_millis(0)).unwrap();
        assert!(dead.is_empty());
    }

    #[test]
    fn rejoin_bumps_incarnation() {
        let s = store();
        let node = NodeId::new();
        let first = s.heartbeat(&node, vec![]).unwrap();
        let second = s.rejoin(&node, vec![]).unwrap();
        assert_eq!(second, first + 1);
    }
}
