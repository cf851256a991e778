//! The presence cell: a per-principal connection counter, explicitly **not
//! persisted** — presence resets with the process. Its `on_activate` never
//! reads storage and its `handle` never writes it, so an activation's
//! in-memory counter is the only copy that ever exists.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use titan_primitives::{CellKind, Identity, Key, TitanResult};
use titan_runtime::{Cell, CallContext};
use uuid::Uuid;

#[derive(Default)]
pub struct PlayerPresence {
    connections: u32,
}

#[derive(Serialize, Deserialize)]
pub enum PresenceCall {
    Connect,
    Disconnect,
    Get,
}

impl titan_runtime::CallKindCheck for PresenceCall {
    fn is_interleavable(&self) -> bool {
        matches!(self, PresenceCall::Get)
    }
}

impl PlayerPresence {
    pub fn identity_for(user_id: Uuid) -> Identity {
        Identity::new(CellKind::from("PlayerPresence"), Key::uuid(user_id))
    }
}

#[async_trait]
impl Cell for PlayerPresence {
    type Call = PresenceCall;
    type Reply = u32;

    fn kind() -> &'static str {
        "PlayerPresence"
    }

    fn new(_identity: Identity) -> Self {
        Self::default()
    }

    async fn on_activate(&mut self, _ctx: &CallContext<Self>) -> TitanResult<()> {
        Ok(())
    }

    async fn handle(&mut self, call: Self::Call, _ctx: &CallContext<Self>) -> TitanResult<Self::Reply> {
        match call {
            PresenceCall::Connect => self.connections += 1,
            PresenceCall::Disconnect => self.connections = self.connections.saturating_sub(1),
            PresenceCall::Get => {}
        }
        Ok(self.connections)
    }

    fn is_interleavable(call: &Self::Call) -> bool {
        matches!(call, PresenceCall::Get)
    }

    fn idle_timeout() -> std::time::Duration {
        std::time::Duration::from_secs(120)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn connect_and_disconnect_adjust_the_counter_without_persisting() {
        let id = PlayerPresence::identity_for(Uuid::new_v4());
        let mut cell = PlayerPresence::new(id.clone());
        let ctx = CallContext::<PlayerPresence>::root(id, None);
        cell.on_activate(&ctx).await.unwrap();
        assert_eq!(cell.handle(PresenceCall::Connect, &ctx).await.unwrap(), 1);
        assert_eq!(cell.handle(PresenceCall::Connect, &ctx).await.unwrap(), 2);
        assert_eq!(cell.handle(PresenceCall::Disconnect, &ctx).await.unwrap(), 1);
    }
}
