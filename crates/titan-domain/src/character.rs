//! The character cell: a player's progress within one season. `die` is the
//! hardcore-death-migration scenario — on death, the character consults its
//! season's flags through a [`titan_runtime::CallerStub`] (exercising the
//! cross-cell caller-stub path rather than reading storage directly) and,
//! if the season is hardcore and not void, seeds a fallback character with
//! hardcore removed.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use titan_primitives::{CellKind, CodecTag, Identity, Key, Precondition, TitanResult, PRIMARY_STORE};
use titan_runtime::{Cell, CallContext};
use titan_storage::{BinaryCodec, Codec, StorageBackend};
use uuid::Uuid;

use crate::infra;
use crate::season::SeasonCall;

#[derive(Clone, Serialize, Deserialize, Debug, Default)]
pub struct CharacterState {
    pub account_id: Uuid,
    pub name: String,
    pub season: String,
    pub hardcore: bool,
    pub dead: bool,
    pub history: Vec<String>,
}

#[derive(Serialize, Deserialize)]
pub enum CharacterCall {
    Create { account_id: Uuid, name: String, season: String, hardcore: bool },
    Die,
    GetHistory,
}

impl titan_runtime::CallKindCheck for CharacterCall {
    fn is_interleavable(&self) -> bool {
        matches!(self, CharacterCall::GetHistory)
    }
}

pub struct Character {
    identity: Identity,
    state: CharacterState,
}

impl Character {
    pub fn identity_for(account_id: Uuid, season: &str, name: &str) -> Identity {
        Identity::new(CellKind::from("Character"), Key::compound(account_id, format!("{season}/{name}")))
    }

    /// Recovers `(accountId, season, name)` from a `Character` identity's
    /// compound key, the inverse of [`Character::identity_for`]. Used by
    /// callers that only hold the identity — e.g. `Trade`, which stores its
    /// participants as bare `Identity` values rather than re-resolving
    /// `CharacterState`.
    pub fn parse_identity(identity: &Identity) -> Option<(Uuid, String, String)> {
        match &identity.key {
            Key::Compound(account_id, season_and_name) => {
                let (season, name) = season_and_name.split_once('/')?;
                Some((*account_id, season.to_string(), name.to_string()))
            }
            _ => None,
        }
    }

    async fn persist(&self) -> TitanResult<()> {
        write_state(&self.identity, &self.state).await
    }
}

async fn load_state(identity: &Identity) -> TitanResult<CharacterState> {
    let backend = infra::backend();
    match backend.read(identity, PRIMARY_STORE).await? {
        Some(rec) => BinaryCodec::decode(&rec.bytes),
        None => Ok(CharacterState::default()),
    }
}

async fn write_state(identity: &Identity, state: &CharacterState) -> TitanResult<()> {
    let backend = infra::backend();
    let existing = backend.read(identity, PRIMARY_STORE).await?;
    let precondition = match existing {
        Some(rec) => Precondition::Exactly(rec.etag),
        None => Precondition::MustNotExist,
    };
    let bytes = BinaryCodec::encode(state)?;
    backend.write(identity, PRIMARY_STORE, bytes, CodecTag::Binary, precondition).await?;
    Ok(())
}

#[async_trait]
impl Cell for Character {
    type Call = CharacterCall;
    type Reply = CharacterState;

    fn kind() -> &'static str {
        "Character"
    }

    fn new(identity: Identity) -> Self {
        Self { identity, state: CharacterState::default() }
    }

    async fn on_activate(&mut self, _ctx: &CallContext<Self>) -> TitanResult<()> {
        self.state = load_state(&self.identity).await?;
        Ok(())
    }

    async fn handle(&mut self, call: Self::Call, ctx: &CallContext<Self>) -> TitanResult<Self::Reply> {
        match call {
            CharacterCall::Create { account_id, name, season, hardcore } => {
                self.state = CharacterState { account_id, name, season, hardcore, dead: false, history: vec!["Created".into()] };
                self.persist().await?;
            }
            CharacterCall::Die => {
                if self.state.dead {
                    return Ok(self.state.clone());
                }
                self.state.dead = true;
                self.state.history.push("Died".into());

                let season_id = crate::season::Season::identity_for(&self.state.season);
                let season = infra::season_caller().call(ctx, &season_id, SeasonCall::Get).await?;

                if self.state.hardcore && season.hardcore && !season.void {
                    if let Some(fallback_season) = season.fallback.clone() {
                        let fallback_identity = Character::identity_for(self.state.account_id, &fallback_season, &self.state.name);
                        let mut fallback_state = load_state(&fallback_identity).await?;
                        fallback_state.account_id = self.state.account_id;
                        fallback_state.name = self.state.name.clone();
                        fallback_state.season = fallback_season;
                        fallback_state.hardcore = false;
                        fallback_state.history.push("MigratedIn".into());
                        write_state(&fallback_identity, &fallback_state).await?;
                        self.state.history.push("Migrated".into());
                    }
                }
                self.persist().await?;
            }
            CharacterCall::GetHistory => {}
        }
        Ok(self.state.clone())
    }

    fn is_interleavable(call: &Self::Call) -> bool {
        matches!(call, CharacterCall::GetHistory)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::season::Season;

    async fn declare_season(name: &str, hardcore: bool, void: bool, fallback: Option<&str>) {
        let id = Season::identity_for(name);
        let mut cell = Season::new(id.clone());
        let ctx = CallContext::<Season>::root(id.clone(), None);
        cell.on_activate(&ctx).await.unwrap();
        cell.handle(SeasonCall::Declare { hardcore, void, fallback: fallback.map(String::from) }, &ctx).await.unwrap();
    }

    #[tokio::test]
    async fn hardcore_death_migrates_to_the_fallback_season() {
        let _guard = infra::TEST_GUARD.lock().unwrap();
        infra::init_for_test();
        declare_season("hc-temp", true, false, Some("standard")).await;
        declare_season("standard", false, false, None).await;

        let account_id = Uuid::new_v4();
        let id = Character::identity_for(account_id, "hc-temp", "Aria");
        let mut character = Character::new(id.clone());
        let ctx = CallContext::<Character>::root(id.clone(), None);
        character.on_activate(&ctx).await.unwrap();
        character
            .handle(CharacterCall::Create { account_id, name: "Aria".into(), season: "hc-temp".into(), hardcore: true }, &ctx)
            .await
            .unwrap();

        let after = character.handle(CharacterCall::Die, &ctx).await.unwrap();
        assert!(after.dead);
        assert!(after.history.contains(&"Died".to_string()));
        assert!(after.history.contains(&"Migrated".to_string()));

        let fallback_id = Character::identity_for(account_id, "standard", "Aria");
        let fallback = load_state(&fallback_id).await.unwrap();
        assert!(!fallback.hardcore);
        assert_eq!(fallback.season, "standard");
    }

    #[tokio::test]
    async fn death_in_a_void_season_never_migrates() {
        let _guard = infra::TEST_GUARD.lock().unwrap();
        infra::init_for_test();
        declare_season("hc-void", true, true, Some("standard")).await;

        let account_id = Uuid::new_v4();
        let id = Character::identity_for(account_id, "hc-void", "Bram");
        let mut character = Character::new(id.clone());
        let ctx = CallContext::<Character>::root(id.clone(), None);
        character.on_activate(&ctx).await.unwrap();
        character
            .handle(CharacterCall::Create { account_id, name: "Bram".into(), season: "hc-void".into(), hardcore: true }, &ctx)
            .await
            .unwrap();

        let after = character.handle(CharacterCall::Die, &ctx).await.unwrap();
        assert!(!after.history.contains(&"Migrated".to_string()));

        let fallback_id = Character::identity_for(account_id, "standard", "Bram");
        let fallback = load_state(&fallback_id).await.unwrap();
        assert_eq!(fallback.name, "");
    }
}
