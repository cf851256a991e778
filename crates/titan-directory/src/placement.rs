//! Consistent-hash placement over live nodes, using
//! rendezvous (highest-random-weight) hashing: each live node gets a score
//! for the identity and the winner changes only for identities whose
//! highest-scoring node left, which is what gives the "stable hash with
//! rebalance on membership change" property this design asks for.

use titan_primitives::Identity;

use crate::node::{MembershipRecord, NodeId};

pub fn choose_node(identity: &Identity, live: &[MembershipRecord]) -> Option<NodeId> {
    live.iter()
        .max_by_key(|rec| score(identity, &rec.node_id))
        .map(|rec| rec.node_id.clone())
}

fn score(identity: &Identity, node_id: &NodeId) -> u64 {
    let mut input = identity.to_bytes();
    input.extend_from_slice(node_id.0.as_bytes());
    let hash = blake3::hash(&input);
    u64::from_le_bytes(hash.as_bytes()[..8].try_into().unwrap())
}
