//! The in-memory presence of a cell on this node: an owned cell instance, its mailbox, and the background
//! tasks (lease renewal, timers) that keep it alive until passivation.

use std::sync::atomic::AtomicU64;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use titan_directory::{Directory, Placement};
use titan_primitives::{Identity, TitanError};

use crate::cell::Cell;
use crate::context::CallContext;
use crate::mailbox::Inbound;
use crate::timer::TimerHandle;

pub struct ActivationHandle<T: Cell> {
    pub tx: mpsc::UnboundedSender<Inbound<T>>,
    pub epoch: u64,
    /// Live timers registered against this activation, kept alive here so
    /// they outlive the `schedule_timer` call that created them; drained and
    /// cancelled when the activation deactivates.
    pub(crate) timers: Arc<Mutex<Vec<TimerHandle>>>,
    pub(crate) next_timer_id: Arc<AtomicU64>,
}

impl<T: Cell> Clone for ActivationHandle<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            epoch: self.epoch,
            timers: Arc::clone(&self.timers),
            next_timer_id: Arc::clone(&self.next_timer_id),
        }
    }
}

/// Spawns the activation task: runs `on_activate`, then services the
/// mailbox one message at a time until idle timeout, fencing, or the
/// channel closes, then runs `on_deactivate` and removes itself from the
/// registry.
pub fn spawn<T: Cell>(
    identity: Identity,
    placement: Placement,
    directory: Arc<Directory>,
    registry: Arc<DashMap<Identity, Vec<ActivationHandle<T>>>>,
) -> Result<ActivationHandle<T>, TitanError> {
    let (tx, mut rx) = mpsc::unbounded_channel::<Inbound<T>>();
    let epoch = placement.epoch;
    let timers = Arc::new(Mutex::new(Vec::new()));
    let next_timer_id = Arc::new(AtomicU64::new(0));
    let handle = ActivationHandle { tx: tx.clone(), epoch, timers: Arc::clone(&timers), next_timer_id };

    let renewal_tx = tx.clone();
    let renewal_directory = Arc::clone(&directory);
    let renewal_identity = identity.clone();
    let renewal_node = placement.node_id.clone();
    let lease_renewal: JoinHandle<()> = tokio::spawn(async move {
        let period = Duration::from_secs(7);
        loop {
            tokio::time::sleep(period).await;
            if renewal_tx.is_closed() {
                break;
            }
            if let Err(e) = renewal_directory.renew_lease(&renewal_identity, &renewal_node, epoch) {
                warn!(identity = %renewal_identity, error = %e, "lease renewal failed; fencing activation");
                let _ = renewal_tx.send(Inbound::Fenced);
                break;
            }
        }
    });

    tokio::spawn(async move {
        let mut cell = T::new(identity.clone());

        let activate_ctx = CallContext::<T>::root(identity.clone(), None);
        if let Err(e) = cell.on_activate(&activate_ctx).await {
            warn!(%identity, error = %e, "on_activate failed; aborting activation");
            lease_renewal.abort();
            let _ = directory.release_lease(&identity);
            registry.remove(&identity);
            return;
        }
        debug!(%identity, "cell activated");

        let idle_timeout = T::idle_timeout();
        loop {
            let next = tokio::time::timeout(idle_timeout, rx.recv()).await;
            match next {
                Ok(Some(Inbound::Call { call, reply, chain, deadline })) => {
                    let ctx = CallContext::<T>::with_chain(identity.clone(), chain, deadline);
                    if ctx.has_expired() {
                        let _ = reply.send(Err(TitanError::timeout("deadline exceeded before dispatch")));
                        continue;
                    }
                    let result = cell.handle(call, &ctx).await;
                    let _ = reply.send(result);
                }
                Ok(Some(Inbound::Timer(id))) => {
                    if let Some(call) = cell.on_timer(id) {
                        let ctx = CallContext::<T>::root(identity.clone(), None);
                        if let Err(e) = cell.handle(call, &ctx).await {
                            warn!(%identity, error = %e, "timer-triggered call failed");
                        }
                    }
                }
                Ok(Some(Inbound::Fenced)) => {
                    warn!(%identity, "activation fenced out; deactivating");
                    break;
                }
                Ok(None) => break, // all senders dropped
                Err(_elapsed) => {
                    info!(%identity, "idle timeout reached; passivating");
                    break;
                }
            }
        }

        if let Ok(mut live) = timers.lock() {
            for t in live.drain(..) {
                t.cancel();
            }
        }
        lease_renewal.abort();
        if let Err(e) = cell.on_deactivate().await {
            warn!(%identity, error = %e, "on_deactivate failed");
        }
        let _ = directory.release_lease(&identity);
        registry.remove(&identity);
        debug!(%identity, "cell deactivated");
    });

    Ok(handle)
}
