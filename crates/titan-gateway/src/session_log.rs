//! The session-log cell: a persisted, bounded ring of a principal's recent
//! gateway connections, opened on first connection of a process and
//! appended to on every subsequent one.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use titan_primitives::{CellKind, CodecTag, Identity, Key, Precondition, TitanResult, PRIMARY_STORE};
use titan_runtime::{Cell, CallContext};
use titan_storage::{Codec, StorageBackend, TextCodec};
use uuid::Uuid;

const MAX_ENTRIES: usize = 20;

#[derive(Clone, Serialize, Deserialize, Debug)]
pub struct SessionLogEntry {
    pub session_id: String,
    pub provider: String,
    pub connected_at_millis: u64,
}

#[derive(Clone, Serialize, Deserialize, Debug, Default)]
pub struct SessionLogState {
    pub entries: Vec<SessionLogEntry>,
}

#[derive(Serialize, Deserialize)]
pub enum SessionLogCall {
    Append(SessionLogEntry),
    GetRecent,
}

impl titan_runtime::CallKindCheck for SessionLogCall {
    fn is_interleavable(&self) -> bool {
        matches!(self, SessionLogCall::GetRecent)
    }
}

pub struct SessionLog {
    identity: Identity,
    state: SessionLogState,
}

impl SessionLog {
    pub fn identity_for(user_id: Uuid) -> Identity {
        Identity::new(CellKind::from("SessionLog"), Key::uuid(user_id))
    }

    async fn persist(&self) -> TitanResult<()> {
        let backend = crate::cells::backend();
        let existing = backend.read(&self.identity, PRIMARY_STORE).await?;
        let precondition = match existing {
            Some(rec) => Precondition::Exactly(rec.etag),
            None => Precondition::MustNotExist,
        };
        let bytes = TextCodec::encode(&self.state)?;
        backend.write(&self.identity, PRIMARY_STORE, bytes, CodecTag::Text, precondition).await?;
        Ok(())
    }
}

#[async_trait]
impl Cell for SessionLog {
    type Call = SessionLogCall;
    type Reply = SessionLogState;

    fn kind() -> &'static str {
        "SessionLog"
    }

    fn new(identity: Identity) -> Self {
        Self { identity, state: SessionLogState::default() }
    }

    async fn on_activate(&mut self, _ctx: &CallContext<Self>) -> TitanResult<()> {
        let backend = crate::cells::backend();
        if let Some(rec) = backend.read(&self.identity, PRIMARY_STORE).await? {
            self.state = TextCodec::decode(&rec.bytes)?;
        }
        Ok(())
    }

    async fn handle(&mut self, call: Self::Call, _ctx: &CallContext<Self>) -> TitanResult<Self::Reply> {
        match call {
            SessionLogCall::Append(entry) => {
                self.state.entries.push(entry);
                if self.state.entries.len() > MAX_ENTRIES {
                    let overflow = self.state.entries.len() - MAX_ENTRIES;
                    self.state.entries.drain(0..overflow);
                }
                self.persist().await?;
            }
            SessionLogCall::GetRecent => {}
        }
        Ok(self.state.clone())
    }

    fn is_interleavable(call: &Self::Call) -> bool {
        matches!(call, SessionLogCall::GetRecent)
    }
}
