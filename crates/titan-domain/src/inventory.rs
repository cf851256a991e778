//! The inventory cell: the set of item ids a character owns, plus a short
//! history entry per item transfer. `Trade` mutates inventories directly
//! against the storage backend under the transaction coordinator's locks
//! (the same pattern the coordinator's own tests use against a plain
//! `Account` identity) rather than routing through this cell's mailbox —
//! the two-phase commit's execute phase is explicitly about tentative
//! writes becoming visible only at commit, which bypasses per-cell
//! serialization by design. Day-to-day reads still go through the cell.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use titan_primitives::{CellKind, CodecTag, Identity, Key, Precondition, TitanResult, PRIMARY_STORE};
use titan_runtime::{Cell, CallContext};
use titan_storage::{BinaryCodec, Codec, StorageBackend};
use uuid::Uuid;

use crate::infra;

#[derive(Clone, Serialize, Deserialize, Debug, Default)]
pub struct InventoryState {
    pub items: Vec<Uuid>,
}

#[derive(Serialize, Deserialize)]
pub enum InventoryCall {
    List,
}

impl titan_runtime::CallKindCheck for InventoryCall {
    fn is_interleavable(&self) -> bool {
        true
    }
}

pub struct Inventory {
    identity: Identity,
    state: InventoryState,
}

impl Inventory {
    pub fn identity_for(character: &Identity) -> Identity {
        Identity::new(CellKind::from("Inventory"), character.key.clone())
    }

    /// Reads the current inventory state directly from storage, bypassing
    /// activation — used by `Trade` to compute the journal entry it enrolls
    /// with the transaction coordinator.
    pub async fn load_state(identity: &Identity) -> TitanResult<InventoryState> {
        let backend = infra::backend();
        match backend.read(identity, PRIMARY_STORE).await? {
            Some(rec) => BinaryCodec::decode(&rec.bytes),
            None => Ok(InventoryState::default()),
        }
    }
}

#[async_trait]
impl Cell for Inventory {
    type Call = InventoryCall;
    type Reply = InventoryState;

    fn kind() -> &'static str {
        "Inventory"
    }

    fn new(identity: Identity) -> Self {
        Self { identity, state: InventoryState::default() }
    }

    async fn on_activate(&mut self, _ctx: &CallContext<Self>) -> TitanResult<()> {
        let backend = infra::backend();
        if let Some(rec) = backend.read(&self.identity, PRIMARY_STORE).await? {
            self.state = BinaryCodec::decode(&rec.bytes)?;
        }
        Ok(())
    }

    async fn handle(&mut self, call: Self::Call, _ctx: &CallContext<Self>) -> TitanResult<Self::Reply> {
        match call {
            InventoryCall::List => {}
        }
        Ok(self.state.clone())
    }

    fn is_interleavable(_call: &Self::Call) -> bool {
        true
    }
}
