//! The per-node cell runtime: owns every activation of a
//! single cell kind hosted on this node and routes calls to it, activating
//! on demand and forwarding to whichever node the directory says actually
//! owns the identity right now.

use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use tokio::sync::oneshot;
use tracing::debug;

use titan_directory::{Directory, NodeId};
use titan_primitives::{ErrorKind, Identity, TitanError, TitanResult};

use crate::activation::{self, ActivationHandle};
use crate::cell::Cell;
use crate::context::CallChain;
use crate::mailbox::Inbound;
use crate::transport::RemoteTransport;

/// Hosts every local activation of one `Cell` implementation. Stateless-
/// worker kinds may carry several replica
/// handles per identity for read fan-out; ordinary cells carry exactly one.
/// When the directory places an identity on a different live node, calls
/// are forwarded over `transport` instead of failing, if one is configured.
pub struct CellRuntime<T: Cell> {
    node_id: NodeId,
    directory: Arc<Directory>,
    activations: Arc<DashMap<Identity, Vec<ActivationHandle<T>>>>,
    next_replica: std::sync::atomic::AtomicUsize,
    transport: Option<Arc<dyn RemoteTransport>>,
}

impl<T: Cell> CellRuntime<T> {
    pub fn new(node_id: NodeId, directory: Arc<Directory>) -> Self {
        Self {
            node_id,
            directory,
            activations: Arc::new(DashMap::new()),
            next_replica: std::sync::atomic::AtomicUsize::new(0),
            transport: None,
        }
    }

    /// Configures forwarding for identities the directory places elsewhere.
    /// Without this, a non-local placement surfaces as a `Transient` error
    /// instead of being routed to its owning node.
    pub fn with_transport(mut self, transport: Arc<dyn RemoteTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Routes `call` to `identity`: serviced by a local activation if the
    /// directory places it here, forwarded to the owning node over
    /// `transport` if it places it elsewhere and one is configured, or a
    /// `Transient` error if neither applies so the caller can retry.
    pub async fn invoke(&self, identity: &Identity, call: T::Call, chain: CallChain, deadline: Option<Instant>) -> TitanResult<T::Reply> {
        if let Some(existing) = self.activations.get(identity) {
            let handle = self.pick_replica(existing.value());
            drop(existing);
            return self.dispatch_local(handle, call, chain, deadline).await;
        }

        let placement = self.directory.locate(identity, &self.node_id)?;
        if !placement.local {
            return self.dispatch_remote(identity, call, &placement.node_id).await;
        }

        let handle = self.activate(identity, placement).await?;
        self.dispatch_local(handle, call, chain, deadline).await
    }

    async fn dispatch_local(&self, handle: ActivationHandle<T>, call: T::Call, chain: CallChain, deadline: Option<Instant>) -> TitanResult<T::Reply> {
        let (reply_tx, reply_rx) = oneshot::channel();
        handle
            .tx
            .send(Inbound::Call { call, reply: reply_tx, chain, deadline })
            .map_err(|_| TitanError::transient("activation mailbox closed; retry will re-activate"))?;
        match reply_rx.await {
            Ok(result) => result,
            Err(_) => Err(TitanError::transient("activation dropped the reply channel")),
        }
    }

    async fn dispatch_remote(&self, identity: &Identity, call: T::Call, node: &NodeId) -> TitanResult<T::Reply> {
        let transport = self.transport.as_ref().ok_or_else(|| {
            TitanError::transient(format!("identity {identity} is placed on node {node}, not {}, and no remote transport is configured", self.node_id))
        })?;
        let payload = bincode::serialize(&call).map_err(|e| TitanError::fatal(format!("failed to encode call for forwarding: {e}")))?;
        let reply_bytes = transport.forward(node, T::kind(), identity, payload).await?;
        bincode::deserialize(&reply_bytes).map_err(|e| TitanError::fatal(format!("failed to decode forwarded reply: {e}")))
    }

    async fn activate(&self, identity: &Identity, placement: titan_directory::Placement) -> Result<ActivationHandle<T>, TitanError> {
        let replicas = if T::is_stateless_worker() { 3 } else { 1 };

        let mut entry = self.activations.entry(identity.clone()).or_insert_with(Vec::new);
        if entry.is_empty() {
            for _ in 0..replicas {
                let h = activation::spawn(identity.clone(), placement.clone(), Arc::clone(&self.directory), Arc::clone(&self.activations))?;
                entry.push(h);
            }
            debug!(%identity, replicas, "spawned new activation(s)");
        }
        Ok(self.pick_replica(&entry[..]))
    }

    fn pick_replica(&self, handles: &[ActivationHandle<T>]) -> ActivationHandle<T> {
        if handles.len() == 1 {
            return handles[0].clone();
        }
        let i = self.next_replica.fetch_add(1, std::sync::atomic::Ordering::Relaxed) % handles.len();
        handles[i].clone()
    }

    /// Evicts every local activation matching `identity`, e.g. after the
    /// directory reassigns it elsewhere. Sends `Fenced` rather than dropping
    /// the handle directly so in-flight calls still queued get a definite
    /// answer instead of a silently dropped reply channel.
    pub fn fence(&self, identity: &Identity) {
        if let Some((_, handles)) = self.activations.remove(identity) {
            for h in handles {
                let _ = h.tx.send(Inbound::Fenced);
            }
        }
    }

    pub fn active_count(&self) -> usize {
        self.activations.len()
    }

    /// Registers a timer against the live activation for `identity`, firing
    /// into its mailbox as `Inbound::Timer`. The
    /// identity must already be activated locally; typically called from
    /// within `Cell::on_activate` via whatever side-channel the cell kind
    /// exposes to request its own recurring ticks.
    pub fn schedule_timer(&self, identity: &Identity, spec: crate::timer::TimerSpec) -> TitanResult<crate::timer::TimerId> {
        let entry = self
            .activations
            .get(identity)
            .ok_or_else(|| TitanError::fatal("cannot schedule a timer for an inactive identity"))?;
        let handle = self.pick_replica(entry.value());
        let id = crate::timer::TimerId(handle.next_timer_id.fetch_add(1, std::sync::atomic::Ordering::Relaxed));
        let th = crate::timer::spawn_timer(spec, handle.tx.clone(), id, Inbound::Timer);
        handle
            .timers
            .lock()
            .map_err(|_| TitanError::fatal("activation timer registry poisoned"))?
            .push(th);
        Ok(id)
    }
}

/// Rejects calls whose deadline has already elapsed before they are even
/// enqueued, so a timed-out caller never pays for activation.
pub fn check_deadline(deadline: Option<Instant>) -> TitanResult<()> {
    if let Some(d) = deadline {
        if Instant::now() > d {
            return Err(TitanError::new(ErrorKind::Timeout, "deadline already elapsed"));
        }
    }
    Ok(())
}

pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(10);

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use titan_primitives::{CellKind, Key};

    struct Counter {
        value: u64,
    }

    #[derive(serde::Serialize, serde::Deserialize)]
    enum CounterCall {
        Increment,
        Read,
    }

    #[async_trait]
    impl Cell for Counter {
        type Call = CounterCall;
        type Reply = u64;

        fn kind() -> &'static str {
            "Counter"
        }

        fn new(_identity: Identity) -> Self {
            Self { value: 0 }
        }

        async fn on_activate(&mut self, _ctx: &crate::context::CallContext<Self>) -> TitanResult<()> {
            Ok(())
        }

        async fn handle(&mut self, call: Self::Call, _ctx: &crate::context::CallContext<Self>) -> TitanResult<Self::Reply> {
            match call {
                CounterCall::Increment => {
                    self.value += 1;
                    Ok(self.value)
                }
                CounterCall::Read => Ok(self.value),
            }
        }

        fn idle_timeout() -> Duration {
            Duration::from_secs(60)
        }
    }

    fn directory() -> (Arc<Directory>, NodeId) {
        let dir = tempfile::tempdir().unwrap();
        let db = sled::open(dir.path()).unwrap();
        std::mem::forget(dir);
        let directory = Directory::open(&db, titan_directory::DirectoryConfig::default()).unwrap();
        let node = NodeId::new();
        directory.heartbeat(&node, vec!["127.0.0.1:9000".into()]).unwrap();
        (Arc::new(directory), node)
    }

    #[tokio::test]
    async fn activates_on_demand_and_serializes_calls() {
        let (directory, node) = directory();
        let runtime = CellRuntime::<Counter>::new(node, directory);
        let id = Identity::new(CellKind::from("Counter"), Key::string("c1"));
        let chain: CallChain = Arc::new(vec![id.clone()]);

        for expected in 1..=5u64 {
            let got = runtime.invoke(&id, CounterCall::Increment, chain.clone(), None).await.unwrap();
            assert_eq!(got, expected);
        }
        assert_eq!(runtime.active_count(), 1);
    }

    #[tokio::test]
    async fn fence_evicts_local_activation() {
        let (directory, node) = directory();
        let runtime = CellRuntime::<Counter>::new(node, directory);
        let id = Identity::new(CellKind::from("Counter"), Key::string("c2"));
        let chain: CallChain = Arc::new(vec![id.clone()]);
        runtime.invoke(&id, CounterCall::Increment, chain.clone(), None).await.unwrap();
        runtime.fence(&id);
        assert_eq!(runtime.active_count(), 0);
    }
}
