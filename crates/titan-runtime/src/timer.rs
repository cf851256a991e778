//! Per-activation timers, modeled on `host/scheduler.rs`'s pattern of a
//! background task posting fired timers back into the owner rather than
//! invoking a callback directly. A timer
//! fires by posting into the owning activation's mailbox, so callbacks are
//! serialized with ordinary operations exactly like an external call.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

#[derive(Clone, Copy, Eq, PartialEq, Hash, Debug)]
pub struct TimerId(pub u64);

pub enum TimerSpec {
    Once(Duration),
    Periodic(Duration),
}

/// Handle to a live timer task; dropping it does not cancel the timer — use
/// [`TimerHandle::cancel`] explicitly, or let activation shutdown abort it.
pub struct TimerHandle {
    join: JoinHandle<()>,
}

impl TimerHandle {
    pub fn cancel(&self) {
        self.join.abort();
    }
}

impl Drop for TimerHandle {
    fn drop(&mut self) {
        // Timers are cancelled explicitly on deactivation; dropping the
        // handle early (e.g. a timer registered and immediately replaced)
        // should not leave a stray tick in flight.
        self.join.abort();
    }
}

/// Spawns a background task that posts `TimerFired(id)`-shaped messages
/// (via `post`) into the owning activation's mailbox on the given spec.
pub fn spawn_timer<M, F>(spec: TimerSpec, tx: mpsc::UnboundedSender<M>, id: TimerId, post: F) -> TimerHandle
where
    M: Send + 'static,
    F: Fn(TimerId) -> M + Send + 'static,
{
    let join = tokio::spawn(async move {
        match spec {
            TimerSpec::Once(delay) => {
                tokio::time::sleep(delay).await;
                let _ = tx.send(post(id));
            }
            TimerSpec::Periodic(period) => {
                let mut interval = tokio::time::interval(period);
                interval.tick().await; // first tick fires immediately; skip it
                loop {
                    interval.tick().await;
                    if tx.send(post(id)).is_err() {
                        break; // activation gone
                    }
                }
            }
        }
    });
    TimerHandle { join }
}
