//! Cluster membership records.

use serde::{Deserialize, Serialize};
use titan_primitives::Timestamp;
use uuid::Uuid;

#[derive(Clone, Eq, PartialEq, Hash, Serialize, Deserialize, Debug)]
pub struct NodeId(pub Uuid);

impl NodeId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for NodeId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Clone, Serialize, Deserialize, Debug)]
pub struct MembershipRecord {
    pub node_id: NodeId,
    pub endpoints: Vec<String>,
    pub heartbeat_at: Timestamp,
    pub incarnation: u64,
}

impl MembershipRecord {
    pub fn is_dead(&self, failure_timeout: std::time::Duration) -> bool {
        let elapsed = titan_primitives::Timestamp::now().as_chrono() - self.heartbeat_at.as_chrono();
        elapsed.to_std().map(|d| d > failure_timeout).unwrap_or(false)
    }
}
