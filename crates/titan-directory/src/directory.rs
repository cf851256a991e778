//! The cluster directory: answers "where is cell X?",
//! resolving a miss by leasing the identity and placing it on a node chosen
//! by consistent hashing over live nodes.

use std::time::Duration;

use titan_primitives::{Identity, TitanError};
use tracing::{debug, warn};

use crate::lease::LeaseStore;
use crate::membership::MembershipStore;
use crate::node::{MembershipRecord, NodeId};
use crate::placement::choose_node;

#[derive(Clone, Debug)]
pub struct DirectoryConfig {
    pub failure_timeout: Duration,
    pub lease_ttl: Duration,
}

impl Default for DirectoryConfig {
    fn default() -> Self {
        Self { failure_timeout: Duration::from_secs(15), lease_ttl: Duration::from_secs(20) }
    }
}

/// A resolved placement: the node hosting `identity`, and the fencing epoch
/// of the lease backing it. Every write the activation makes downstream
/// should be tagged with `epoch` so a fenced-out former holder's stale
/// writes can be rejected. `epoch` is only meaningful when `local` is true;
/// a remote placement carries no lease since only the owning node acquires
/// one.
#[derive(Clone, Debug)]
pub struct Placement {
    pub node_id: NodeId,
    pub epoch: u64,
    pub local: bool,
}

pub struct Directory {
    membership: MembershipStore,
    leases: LeaseStore,
    config: DirectoryConfig,
}

impl Directory {
    pub fn open(db: &sled::Db, config: DirectoryConfig) -> Result<Self, TitanError> {
        let membership = MembershipStore::open(db).map_err(TitanError::from)?;
        let leases = LeaseStore::open(db).map_err(TitanError::from)?;
        Ok(Self { membership, leases, config })
    }

    pub fn heartbeat(&self, node_id: &NodeId, endpoints: Vec<String>) -> Result<u64, TitanError> {
        self.membership.heartbeat(node_id, endpoints).map_err(TitanError::from)
    }

    /// Nodes with a heartbeat inside `failure_timeout`, for admin surfaces
    /// that report cluster membership rather than resolve placement.
    pub fn live_nodes(&self, failure_timeout: Duration) -> Result<Vec<MembershipRecord>, TitanError> {
        self.membership.live_nodes(failure_timeout).map_err(TitanError::from)
    }

    /// The failure timeout this directory was opened with, so callers that
    /// need it for their own `live_nodes` lookups (e.g. a forwarding
    /// transport resolving a target node's endpoint) don't have to carry a
    /// second copy of the configuration.
    pub fn failure_timeout(&self) -> Duration {
        self.config.failure_timeout
    }

    /// Resolves placement for `identity`, acquiring a lease on behalf of
    /// `local_node` if no live node currently holds one. If the runtime
    /// cannot prove uniqueness (directory split-brain), this returns a
    /// `Transient` error and the caller retries. If a different live node
    /// owns the identity, returns that node's placement with `local: false`
    /// and no lease acquired — the caller (`CellRuntime`) forwards the
    /// invocation there over its configured `RemoteTransport` rather than
    /// activating locally.
    pub fn locate(&self, identity: &Identity, local_node: &NodeId) -> Result<Placement, TitanError> {
        let live = self.membership.live_nodes(self.config.failure_timeout).map_err(TitanError::from)?;
        if live.iter().all(|n| n.node_id != *local_node) {
            return Err(TitanError::transient("local node has no live heartbeat in the directory"));
        }
        let target = choose_node(identity, &live)
            .ok_or_else(|| TitanError::transient("no live nodes to place cell on"))?;
        if target != *local_node {
            debug!(%identity, %target, "identity placed on remote node; caller should forward there");
            return Ok(Placement { node_id: target, epoch: 0, local: false });
        }
        match self.leases.acquire(identity, local_node, self.config.lease_ttl) {
            Ok(epoch) => Ok(Placement { node_id: local_node.clone(), epoch, local: true }),
            Err(e) => {
                warn!(%identity, error = %e, "failed to acquire activation lease");
                Err(TitanError::from(e))
            }
        }
    }

    pub fn renew_lease(&self, identity: &Identity, node_id: &NodeId, epoch: u64) -> Result<(), TitanError> {
        self.leases.renew(identity, node_id, epoch, self.config.lease_ttl).map_err(TitanError::from)
    }

    pub fn release_lease(&self, identity: &Identity) -> Result<(), TitanError> {
        self.leases.release(identity).map_err(TitanError::from)
    }

    /// Administrative: removes placement so the next `locate` chooses a
    /// fresh node.
    pub fn evict(&self, identity: &Identity) -> Result<(), TitanError> {
        self.leases.evict(identity).map_err(TitanError::from)
    }
}
