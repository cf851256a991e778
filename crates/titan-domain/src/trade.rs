//! The trade cell: the two-phase-commit showcase. `startTrade`/`addItem`
//! build up an offer under ordinary per-cell serialization; `accept`, once
//! both sides have accepted, drives the transaction coordinator directly
//! against both participants' inventory slots and publishes the trade's
//! event sequence over the stream substrate.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use titan_primitives::{CellKind, CodecTag, Identity, Key, TitanError, TitanResult, PRIMARY_STORE};
use titan_rules::{Rule, RuleChain};
use titan_runtime::{Cell, CallContext};
use titan_storage::{BinaryCodec, Codec};
use titan_streams::StreamId;
use uuid::Uuid;

use crate::account::{Account, AccountCall};
use crate::character::Character;
use crate::infra;
use crate::inventory::{Inventory, InventoryState};

struct TradeRuleContext {
    same_season: bool,
    either_party_solo_conflict: bool,
}

struct SameSeason;
impl Rule<TradeRuleContext> for SameSeason {
    fn name(&self) -> &'static str {
        "SameSeason"
    }
    fn validate(&self, ctx: &TradeRuleContext) -> Result<(), String> {
        if ctx.same_season {
            Ok(())
        } else {
            Err("both characters must be in the same season".into())
        }
    }
}

/// A solo self-found account (the `"SoloSelfFound"` role, checked against
/// both participants' `Account` profiles) never trades, even with another
/// solo self-found account.
struct SoloSelfFound;
impl Rule<TradeRuleContext> for SoloSelfFound {
    fn name(&self) -> &'static str {
        "SoloSelfFound"
    }
    fn validate(&self, ctx: &TradeRuleContext) -> Result<(), String> {
        if ctx.either_party_solo_conflict {
            Err("a solo self-found character cannot trade with a grouped character".into())
        } else {
            Ok(())
        }
    }
}

#[derive(Clone, Copy, Eq, PartialEq, Serialize, Deserialize, Debug)]
pub enum TradeStatus {
    Open,
    Completed,
    Conflicted,
}

#[derive(Clone, Serialize, Deserialize, Debug)]
pub struct TradeState {
    pub season: String,
    pub participants: [Identity; 2],
    pub offers: [Vec<Uuid>; 2],
    pub accepted: [bool; 2],
    pub status: TradeStatus,
}

impl Default for TradeState {
    fn default() -> Self {
        let placeholder = Identity::new(CellKind::from("Character"), Key::string(""));
        Self {
            season: String::new(),
            participants: [placeholder.clone(), placeholder],
            offers: [Vec::new(), Vec::new()],
            accepted: [false, false],
            status: TradeStatus::Open,
        }
    }
}

#[derive(Serialize, Deserialize)]
pub enum TradeCall {
    Start { season: String, participants: [Identity; 2] },
    AddItem { participant_index: usize, item: Uuid },
    Accept { participant_index: usize },
    Get,
}

impl titan_runtime::CallKindCheck for TradeCall {
    fn is_interleavable(&self) -> bool {
        matches!(self, TradeCall::Get)
    }
}

pub struct Trade {
    identity: Identity,
    state: TradeState,
    trade_id: Uuid,
}

impl Trade {
    pub fn identity_for(trade_id: Uuid) -> Identity {
        Identity::new(CellKind::from("Trade"), Key::uuid(trade_id))
    }

    fn stream(&self) -> StreamId {
        StreamId::new("trade", self.state.season.clone(), self.trade_id.to_string())
    }

    async fn publish(&self, label: &str) {
        let _ = infra::streams().publish(&self.stream(), label.as_bytes().to_vec()).await;
    }

    /// Builds the rule context `AddItem` validates against from the two
    /// participants' actual `Character` identities and `Account` roles,
    /// the same caller-stub pattern `Character::handle`'s `Die` branch uses
    /// to consult `Season` rather than reaching into storage directly.
    async fn rule_context(&self, ctx: &CallContext<Self>) -> TitanResult<TradeRuleContext> {
        let parsed: Vec<Option<(Uuid, String, String)>> = self.state.participants.iter().map(Character::parse_identity).collect();

        let same_season = match (&parsed[0], &parsed[1]) {
            (Some((_, season_a, _)), Some((_, season_b, _))) => season_a == season_b,
            _ => false,
        };

        let mut either_party_solo_conflict = false;
        for participant in parsed.iter().flatten() {
            let (account_id, _, _) = participant;
            let account_identity = Account::identity_for(*account_id);
            let profile = infra::account_caller().call(ctx, &account_identity, AccountCall::GetProfile).await?;
            if profile.roles.iter().any(|role| role == "SoloSelfFound") {
                either_party_solo_conflict = true;
                break;
            }
        }

        Ok(TradeRuleContext { same_season, either_party_solo_conflict })
    }

    async fn try_complete(&mut self) -> TitanResult<()> {
        if !(self.state.accepted[0] && self.state.accepted[1]) {
            return Ok(());
        }
        self.publish("TradeAccepted").await;

        let coordinator = infra::coordinator();
        let tx = coordinator.begin();

        let inv_a = Inventory::identity_for(&self.state.participants[0]);
        let inv_b = Inventory::identity_for(&self.state.participants[1]);
        let state_a = Inventory::load_state(&inv_a).await?;
        let state_b = Inventory::load_state(&inv_b).await?;

        let mut new_a = state_a.items.clone();
        new_a.retain(|i| !self.state.offers[0].contains(i));
        new_a.extend(self.state.offers[1].iter().cloned());

        let mut new_b = state_b.items.clone();
        new_b.retain(|i| !self.state.offers[1].contains(i));
        new_b.extend(self.state.offers[0].iter().cloned());

        let bytes_a = BinaryCodec::encode(&InventoryState { items: new_a })?;
        let bytes_b = BinaryCodec::encode(&InventoryState { items: new_b })?;

        let result: TitanResult<()> = async {
            coordinator.enroll_write(tx, &inv_a, PRIMARY_STORE, bytes_a, CodecTag::Binary).await?;
            coordinator.enroll_write(tx, &inv_b, PRIMARY_STORE, bytes_b, CodecTag::Binary).await?;
            coordinator.prepare(tx).await?;
            coordinator.commit(tx).await
        }
        .await;

        match result {
            Ok(()) => {
                self.state.status = TradeStatus::Completed;
                self.publish("TradeCompleted").await;
                Ok(())
            }
            Err(e) => {
                coordinator.abort(tx).await.ok();
                self.state.status = TradeStatus::Conflicted;
                Err(e)
            }
        }
    }
}

#[async_trait]
impl Cell for Trade {
    type Call = TradeCall;
    type Reply = TradeState;

    fn kind() -> &'static str {
        "Trade"
    }

    fn new(identity: Identity) -> Self {
        let trade_id = match &identity.key {
            titan_primitives::Key::Uuid(u) => *u,
            _ => Uuid::nil(),
        };
        Self { identity, state: TradeState::default(), trade_id }
    }

    async fn on_activate(&mut self, _ctx: &CallContext<Self>) -> TitanResult<()> {
        Ok(())
    }

    async fn handle(&mut self, call: Self::Call, ctx: &CallContext<Self>) -> TitanResult<Self::Reply> {
        match call {
            TradeCall::Start { season, participants } => {
                self.state = TradeState { season, participants, offers: [Vec::new(), Vec::new()], accepted: [false, false], status: TradeStatus::Open };
                self.publish("TradeStarted").await;
            }
            TradeCall::AddItem { participant_index, item } => {
                let rule_ctx = self.rule_context(ctx).await?;
                RuleChain::new().push(SameSeason).push(SoloSelfFound).validate(&rule_ctx)?;
                self.state
                    .offers
                    .get_mut(participant_index)
                    .ok_or_else(|| TitanError::invalid_input("participant_index out of range"))?
                    .push(item);
                self.publish("ItemAdded").await;
            }
            TradeCall::Accept { participant_index } => {
                if self.state.status != TradeStatus::Open {
                    return Err(TitanError::conflict("trade is no longer open"));
                }
                *self
                    .state
                    .accepted
                    .get_mut(participant_index)
                    .ok_or_else(|| TitanError::invalid_input("participant_index out of range"))? = true;
                self.try_complete().await?;
            }
            TradeCall::Get => {}
        }
        Ok(self.state.clone())
    }

    fn is_interleavable(call: &Self::Call) -> bool {
        matches!(call, TradeCall::Get)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use titan_primitives::{CodecTag as CT, Precondition};
    use titan_storage::StorageBackend;

    fn character(account_id: Uuid, season: &str, name: &str) -> Identity {
        Character::identity_for(account_id, season, name)
    }

    async fn seed_inventory(identity: &Identity, items: Vec<Uuid>) {
        let backend = infra::backend();
        let bytes = BinaryCodec::encode(&InventoryState { items }).unwrap();
        backend.write(identity, PRIMARY_STORE, bytes, CT::Binary, Precondition::MustNotExist).await.unwrap();
    }

    #[tokio::test]
    async fn happy_path_swaps_items_between_participants() {
        let _guard = infra::TEST_GUARD.lock().unwrap();
        infra::init_for_test();

        let c1 = character(Uuid::new_v4(), "standard", "c1");
        let c2 = character(Uuid::new_v4(), "standard", "c2");
        let i1 = Uuid::new_v4();
        let i2 = Uuid::new_v4();
        seed_inventory(&Inventory::identity_for(&c1), vec![i1]).await;
        seed_inventory(&Inventory::identity_for(&c2), vec![i2]).await;

        let trade_id = Uuid::new_v4();
        let id = Trade::identity_for(trade_id);
        let mut trade = Trade::new(id.clone());
        let ctx = CallContext::<Trade>::root(id.clone(), None);
        trade.on_activate(&ctx).await.unwrap();

        trade.handle(TradeCall::Start { season: "standard".into(), participants: [c1.clone(), c2.clone()] }, &ctx).await.unwrap();
        trade.handle(TradeCall::AddItem { participant_index: 0, item: i1 }, &ctx).await.unwrap();
        trade.handle(TradeCall::AddItem { participant_index: 1, item: i2 }, &ctx).await.unwrap();
        trade.handle(TradeCall::Accept { participant_index: 0 }, &ctx).await.unwrap();
        let after = trade.handle(TradeCall::Accept { participant_index: 1 }, &ctx).await.unwrap();

        assert_eq!(after.status, TradeStatus::Completed);
        let c1_inv = Inventory::load_state(&Inventory::identity_for(&c1)).await.unwrap();
        let c2_inv = Inventory::load_state(&Inventory::identity_for(&c2)).await.unwrap();
        assert_eq!(c1_inv.items, vec![i2]);
        assert_eq!(c2_inv.items, vec![i1]);
    }

    #[tokio::test]
    async fn second_of_two_conflicting_trades_for_the_same_item_aborts() {
        let _guard = infra::TEST_GUARD.lock().unwrap();
        infra::init_for_test();

        let c1 = character(Uuid::new_v4(), "standard", "c1");
        let c2 = character(Uuid::new_v4(), "standard", "c2");
        let c3 = character(Uuid::new_v4(), "standard", "c3");
        let i1 = Uuid::new_v4();
        seed_inventory(&Inventory::identity_for(&c1), vec![i1]).await;
        seed_inventory(&Inventory::identity_for(&c2), vec![]).await;
        seed_inventory(&Inventory::identity_for(&c3), vec![]).await;

        let mut trade_a = Trade::new(Trade::identity_for(Uuid::new_v4()));
        let ctx_a = CallContext::<Trade>::root(trade_a.identity.clone(), None);
        trade_a.on_activate(&ctx_a).await.unwrap();
        trade_a.handle(TradeCall::Start { season: "standard".into(), participants: [c1.clone(), c2.clone()] }, &ctx_a).await.unwrap();
        trade_a.handle(TradeCall::AddItem { participant_index: 0, item: i1 }, &ctx_a).await.unwrap();

        let mut trade_b = Trade::new(Trade::identity_for(Uuid::new_v4()));
        let ctx_b = CallContext::<Trade>::root(trade_b.identity.clone(), None);
        trade_b.on_activate(&ctx_b).await.unwrap();
        trade_b.handle(TradeCall::Start { season: "standard".into(), participants: [c1.clone(), c3.clone()] }, &ctx_b).await.unwrap();
        trade_b.handle(TradeCall::AddItem { participant_index: 0, item: i1 }, &ctx_b).await.unwrap();

        trade_a.handle(TradeCall::Accept { participant_index: 0 }, &ctx_a).await.unwrap();
        let a_result = trade_a.handle(TradeCall::Accept { participant_index: 1 }, &ctx_a).await.unwrap();
        assert_eq!(a_result.status, TradeStatus::Completed);

        trade_b.handle(TradeCall::Accept { participant_index: 0 }, &ctx_b).await.unwrap();
        let b_result = trade_b.handle(TradeCall::Accept { participant_index: 1 }, &ctx_b).await;
        assert!(b_result.is_err());

        let c1_inv = Inventory::load_state(&Inventory::identity_for(&c1)).await.unwrap();
        assert!(!c1_inv.items.contains(&i1) || c1_inv.items == Vec::<Uuid>::new());
    }

    async fn grant_role(account_id: Uuid, role: &str) {
        let id = Account::identity_for(account_id);
        let mut cell = Account::new(id.clone());
        let ctx = CallContext::<Account>::root(id.clone(), None);
        cell.on_activate(&ctx).await.unwrap();
        cell.handle(AccountCall::GrantRole(role.into()), &ctx).await.unwrap();
    }

    #[tokio::test]
    async fn add_item_rejects_participants_in_different_seasons() {
        let _guard = infra::TEST_GUARD.lock().unwrap();
        infra::init_for_test();

        let c1 = character(Uuid::new_v4(), "standard", "c1");
        let c2 = character(Uuid::new_v4(), "hc-temp", "c2");
        let i1 = Uuid::new_v4();
        seed_inventory(&Inventory::identity_for(&c1), vec![i1]).await;

        let id = Trade::identity_for(Uuid::new_v4());
        let mut trade = Trade::new(id.clone());
        let ctx = CallContext::<Trade>::root(id.clone(), None);
        trade.on_activate(&ctx).await.unwrap();
        trade.handle(TradeCall::Start { season: "standard".into(), participants: [c1, c2] }, &ctx).await.unwrap();

        let result = trade.handle(TradeCall::AddItem { participant_index: 0, item: i1 }, &ctx).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn add_item_rejects_a_solo_self_found_participant() {
        let _guard = infra::TEST_GUARD.lock().unwrap();
        infra::init_for_test();

        let account1 = Uuid::new_v4();
        let account2 = Uuid::new_v4();
        grant_role(account1, "SoloSelfFound").await;

        let c1 = character(account1, "standard", "c1");
        let c2 = character(account2, "standard", "c2");
        let i1 = Uuid::new_v4();
        seed_inventory(&Inventory::identity_for(&c1), vec![i1]).await;

        let id = Trade::identity_for(Uuid::new_v4());
        let mut trade = Trade::new(id.clone());
        let ctx = CallContext::<Trade>::root(id.clone(), None);
        trade.on_activate(&ctx).await.unwrap();
        trade.handle(TradeCall::Start { season: "standard".into(), participants: [c1, c2] }, &ctx).await.unwrap();

        let result = trade.handle(TradeCall::AddItem { participant_index: 0, item: i1 }, &ctx).await;
        assert!(result.is_err());
    }
}
