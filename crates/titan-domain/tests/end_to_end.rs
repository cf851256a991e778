//! Drives the literal trade and hardcore-death scenarios through the public
//! cell API, the same way a host binary's dispatcher would, rather than
//! through any one cell's inline unit tests.

use std::sync::{Arc, Mutex};
use uuid::Uuid;

use titan_directory::{Directory, DirectoryConfig, NodeId};
use titan_domain::{Account, AccountCall, Character, CharacterCall, Inventory, InventoryCall, InventoryState, Season, SeasonCall, Trade, TradeCall, TradeStatus};
use titan_runtime::{Cell, CallContext};
use titan_storage::{BinaryCodec, Codec, RetryConfig, RetryingBackend, SledBackend, StorageBackend};
use titan_streams::MemoryProvider;
use titan_txn::Coordinator;

// `titan_domain::infra` is process-wide global state; these tests must not
// run concurrently with each other.
static GUARD: Mutex<()> = Mutex::new(());

fn setup() {
    let dir = tempfile::tempdir().unwrap();
    let db = sled::open(dir.path()).unwrap();
    std::mem::forget(dir);
    let backend = Arc::new(RetryingBackend::new(SledBackend::open(&db, "domain-e2e-test").unwrap(), RetryConfig::default()));
    let coordinator = Arc::new(Coordinator::new(Arc::clone(&backend)));
    let streams = MemoryProvider::new();

    let directory_dir = tempfile::tempdir().unwrap();
    let directory_db = sled::open(directory_dir.path()).unwrap();
    std::mem::forget(directory_dir);
    let directory = Arc::new(Directory::open(&directory_db, DirectoryConfig::default()).unwrap());
    let node = NodeId::new();
    directory.heartbeat(&node, vec!["127.0.0.1:9400".into()]).unwrap();

    titan_domain::infra::init(backend, coordinator, streams, directory, node);
}

async fn activate<T: Cell>(identity: titan_primitives::Identity) -> (T, CallContext<T>) {
    let mut cell = T::new(identity.clone());
    let ctx = CallContext::<T>::root(identity, None);
    cell.on_activate(&ctx).await.unwrap();
    (cell, ctx)
}

#[tokio::test]
async fn trade_happy_path_swaps_items_and_completes() {
    let _guard = GUARD.lock().unwrap();
    setup();

    let account1 = Uuid::new_v4();
    let account2 = Uuid::new_v4();

    let (mut season, season_ctx) = activate::<Season>(Season::identity_for("standard")).await;
    season.handle(SeasonCall::Declare { hardcore: false, void: false, fallback: None }, &season_ctx).await.unwrap();

    let char1_id = Character::identity_for(account1, "standard", "Aria");
    let (mut char1, char1_ctx) = activate::<Character>(char1_id.clone()).await;
    char1.handle(CharacterCall::Create { account_id: account1, name: "Aria".into(), season: "standard".into(), hardcore: false }, &char1_ctx).await.unwrap();

    let char2_id = Character::identity_for(account2, "standard", "Bram");
    let (mut char2, char2_ctx) = activate::<Character>(char2_id.clone()).await;
    char2.handle(CharacterCall::Create { account_id: account2, name: "Bram".into(), season: "standard".into(), hardcore: false }, &char2_ctx).await.unwrap();

    let i1 = Uuid::new_v4();
    let i2 = Uuid::new_v4();
    let inv1_id = Inventory::identity_for(&char1_id);
    let inv2_id = Inventory::identity_for(&char2_id);
    let backend = titan_domain::infra::backend();
    backend
        .write(&inv1_id, titan_primitives::PRIMARY_STORE, BinaryCodec::encode(&InventoryState { items: vec![i1] }).unwrap(), titan_primitives::CodecTag::Binary, titan_primitives::Precondition::MustNotExist)
        .await
        .unwrap();
    backend
        .write(&inv2_id, titan_primitives::PRIMARY_STORE, BinaryCodec::encode(&InventoryState { items: vec![i2] }).unwrap(), titan_primitives::CodecTag::Binary, titan_primitives::Precondition::MustNotExist)
        .await
        .unwrap();

    let trade_id = Uuid::new_v4();
    let (mut trade, trade_ctx) = activate::<Trade>(Trade::identity_for(trade_id)).await;
    trade.handle(TradeCall::Start { season: "standard".into(), participants: [char1_id.clone(), char2_id.clone()] }, &trade_ctx).await.unwrap();
    trade.handle(TradeCall::AddItem { participant_index: 0, item: i1 }, &trade_ctx).await.unwrap();
    trade.handle(TradeCall::AddItem { participant_index: 1, item: i2 }, &trade_ctx).await.unwrap();
    trade.handle(TradeCall::Accept { participant_index: 0 }, &trade_ctx).await.unwrap();
    let after = trade.handle(TradeCall::Accept { participant_index: 1 }, &trade_ctx).await.unwrap();
    assert_eq!(after.status, TradeStatus::Completed);

    let (mut inv1, inv1_ctx) = activate::<Inventory>(inv1_id).await;
    let inv1_state = inv1.handle(InventoryCall::List, &inv1_ctx).await.unwrap();
    assert_eq!(inv1_state.items, vec![i2]);

    let (mut inv2, inv2_ctx) = activate::<Inventory>(inv2_id).await;
    let inv2_state = inv2.handle(InventoryCall::List, &inv2_ctx).await.unwrap();
    assert_eq!(inv2_state.items, vec![i1]);
}

#[tokio::test]
async fn hardcore_death_migrates_to_the_fallback_season_unless_void() {
    let _guard = GUARD.lock().unwrap();
    setup();

    let (mut hc, hc_ctx) = activate::<Season>(Season::identity_for("hc-temp")).await;
    hc.handle(SeasonCall::Declare { hardcore: true, void: false, fallback: Some("standard".into()) }, &hc_ctx).await.unwrap();
    let (mut standard, standard_ctx) = activate::<Season>(Season::identity_for("standard")).await;
    standard.handle(SeasonCall::Declare { hardcore: false, void: false, fallback: None }, &standard_ctx).await.unwrap();

    let account_id = Uuid::new_v4();
    let char_id = Character::identity_for(account_id, "hc-temp", "Cato");
    let (mut character, ctx) = activate::<Character>(char_id).await;
    character.handle(CharacterCall::Create { account_id, name: "Cato".into(), season: "hc-temp".into(), hardcore: true }, &ctx).await.unwrap();

    let after = character.handle(CharacterCall::Die, &ctx).await.unwrap();
    assert!(after.dead);
    assert_eq!(after.history, vec!["Created".to_string(), "Died".to_string(), "Migrated".to_string()]);

    let fallback_id = Character::identity_for(account_id, "standard", "Cato");
    let (mut fallback, fallback_ctx) = activate::<Character>(fallback_id).await;
    let fallback_state = fallback.handle(CharacterCall::GetHistory, &fallback_ctx).await.unwrap();
    assert!(!fallback_state.hardcore);
    assert_eq!(fallback_state.season, "standard");
}

#[tokio::test]
async fn account_role_grant_persists_for_the_trade_solo_self_found_rule() {
    let _guard = GUARD.lock().unwrap();
    setup();

    let account_id = Uuid::new_v4();
    let (mut account, ctx) = activate::<Account>(Account::identity_for(account_id)).await;
    account.handle(AccountCall::GrantRole("SoloSelfFound".into()), &ctx).await.unwrap();
    let profile = account.handle(AccountCall::GetProfile, &ctx).await.unwrap();
    assert!(profile.roles.contains(&"SoloSelfFound".to_string()));
}
