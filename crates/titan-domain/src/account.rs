//! The account cell: a thin profile keyed by user id. Illustrates the
//! simplest possible cell — one state slot, no cross-cell calls — so the
//! richer cells (`Character`, `Trade`) read as elaborations rather than the
//! baseline case.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use titan_primitives::{CodecTag, Identity, Precondition, TitanResult, PRIMARY_STORE};
use titan_runtime::{Cell, CallContext};
use titan_storage::{BinaryCodec, Codec, StorageBackend};
use uuid::Uuid;

use crate::infra;

#[derive(Clone, Serialize, Deserialize, Debug, Default)]
pub struct AccountState {
    pub display_name: String,
    pub roles: Vec<String>,
}

#[derive(Serialize, Deserialize)]
pub enum AccountCall {
    SetDisplayName(String),
    GrantRole(String),
    GetProfile,
}

impl titan_runtime::CallKindCheck for AccountCall {
    fn is_interleavable(&self) -> bool {
        matches!(self, AccountCall::GetProfile)
    }
}

pub struct Account {
    identity: Identity,
    state: AccountState,
}

impl Account {
    pub fn identity_for(user_id: Uuid) -> Identity {
        Identity::new(titan_primitives::CellKind::from("Account"), titan_primitives::Key::uuid(user_id))
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
impl Cell for Account {
    type Call = AccountCall;
    type Reply = AccountState;

    fn kind() -> &'static str {
        "Account"
    }

    fn new(identity: Identity) -> Self {
        Self { identity, state: AccountState::default() }
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
            AccountCall::SetDisplayName(name) => {
                self.state.display_name = name;
                self.persist().await?;
            }
            AccountCall::GrantRole(role) => {
                if !self.state.roles.contains(&role) {
                    self.state.roles.push(role);
                }
                self.persist().await?;
            }
            AccountCall::GetProfile => {}
        }
        Ok(self.state.clone())
    }

    fn is_interleavable(call: &Self::Call) -> bool {
        matches!(call, AccountCall::GetProfile)
    }
}
