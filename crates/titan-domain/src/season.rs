//! The season cell: declares the ruleset ladder characters are created
//! into. `Character::die` consults a season's flags directly through a
//! [`titan_runtime::CallerStub`] to decide whether a hardcore death
//! migrates the character to the permanent fallback season.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use titan_primitives::{CellKind, CodecTag, Identity, Key, Precondition, TitanResult, PRIMARY_STORE};
use titan_runtime::{Cell, CallContext};
use titan_storage::{BinaryCodec, Codec, StorageBackend};

use crate::infra;

#[derive(Clone, Serialize, Deserialize, Debug, Default)]
pub struct SeasonState {
    pub declared: bool,
    pub hardcore: bool,
    /// A `void` season never receives hardcore-death migrations from it.
    pub void: bool,
    /// The season a hardcore death in this season migrates its surviving
    /// character into.
    pub fallback: Option<String>,
}

#[derive(Serialize, Deserialize)]
pub enum SeasonCall {
    Declare { hardcore: bool, void: bool, fallback: Option<String> },
    Get,
}

impl titan_runtime::CallKindCheck for SeasonCall {
    fn is_interleavable(&self) -> bool {
        matches!(self, SeasonCall::Get)
    }
}

pub struct Season {
    identity: Identity,
    state: SeasonState,
}

impl Season {
    pub fn identity_for(name: &str) -> Identity {
        Identity::new(CellKind::from("Season"), Key::string(name))
    }

    async fn persist(&self) -> TitanResult<()> {
        let backend = infra::backend();
        let existing = backend.read(&self.identity, PRIMARY_STORE).await?;
        let precondition = match existing {
            Some(rec) => Precondition::Exactly(rec.etag),
            None => Precondition::MustNotExist,
        };
        let bytes = BinaryCodec::encode(&self.state)?;
        backend.write(&self.identity, PRIMARY_STORE, bytes, CodecTag::Binary, precondition).await?;
        Ok(())
    }
}

#[async_trait]
impl Cell for Season {
    type Call = SeasonCall;
    type Reply = SeasonState;

    fn kind() -> &'static str {
        "Season"
    }

    fn new(identity: Identity) -> Self {
        Self { identity, state: SeasonState::default() }
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
            SeasonCall::Declare { hardcore, void, fallback } => {
                self.state = SeasonState { declared: true, hardcore, void, fallback };
                self.persist().await?;
            }
            SeasonCall::Get => {}
        }
        Ok(self.state.clone())
    }

    fn is_interleavable(call: &Self::Call) -> bool {
        matches!(call, SeasonCall::Get)
    }
}
