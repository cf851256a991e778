//! Exclusive slot locks held for the lifetime of one transaction's execute
//! phase.
//! Acquisition is a bounded wait rather than a queue: a waiter that cannot
//! get the lock before its deadline gives up with a conflict rather than
//! risking a cross-transaction deadlock.

use std::time::Duration;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use titan_primitives::{Identity, SlotName, TitanError, TitanResult};
use tokio::time::Instant;

use crate::ids::TxId;

pub struct LockTable {
    held: DashMap<(Identity, SlotName), TxId>,
}

impl LockTable {
    pub fn new() -> Self {
        Self { held: DashMap::new() }
    }

    /// Acquires the exclusive lock on `(identity, slot)` for `tx`, polling
    /// until `timeout` elapses. Re-entrant for the same `tx` (a transaction
    /// enrolling the same slot twice, e.g. read-then-write, does not
    /// self-deadlock).
    pub async fn acquire(&self, identity: &Identity, slot: SlotName, tx: TxId, timeout: Duration) -> TitanResult<()> {
        let key = (identity.clone(), slot);
        let deadline = Instant::now() + timeout;
        loop {
            let acquired = match self.held.entry(key.clone()) {
                Entry::Vacant(v) => {
                    v.insert(tx);
                    true
                }
                Entry::Occupied(o) => *o.get() == tx,
            };
            if acquired {
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(TitanError::conflict(format!("timed out waiting for lock on {identity}")));
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    /// Releases every lock `tx` holds, called once on commit or abort.
    pub fn release_all(&self, tx: TxId) {
        self.held.retain(|_, holder| *holder != tx);
    }
}

impl Default for LockTable {
    fn default() -> Self {
        Self::new()
    }
}
