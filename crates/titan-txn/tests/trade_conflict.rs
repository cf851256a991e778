//! Two trades both spend the same item: exactly one reaches `Committed`,
//! the other's `enroll_write` conflicts, and the item ends up in exactly
//! one resulting inventory.

use std::sync::Arc;
use std::time::Duration;

use titan_primitives::{CellKind, CodecTag, ErrorKind, Identity, Key, PRIMARY_STORE};
use titan_storage::{SledBackend, StorageBackend};
use titan_txn::{Coordinator, TxOutcome};

fn backend() -> Arc<SledBackend> {
    let dir = tempfile::tempdir().unwrap();
    let db = sled::open(dir.path()).unwrap();
    std::mem::forget(dir);
    Arc::new(SledBackend::open(&db, "txn-conflict-test").unwrap())
}

fn inventory(name: &str) -> Identity {
    Identity::new(CellKind::from("Inventory"), Key::string(name))
}

#[tokio::test]
async fn second_of_two_trades_spending_the_same_item_conflicts() {
    let backend = backend();
    let coordinator = Coordinator::new(Arc::clone(&backend)).with_lock_timeout(Duration::from_millis(50));

    let c1 = inventory("c1");
    let c2 = inventory("c2");
    let c3 = inventory("c3");

    // Trade A: c1 -> c2, spending c1's item.
    let tx_a = coordinator.begin();
    coordinator.enroll_write(tx_a, &c1, PRIMARY_STORE, b"i1 moved to c2".to_vec(), CodecTag::Binary).await.unwrap();
    coordinator.enroll_write(tx_a, &c2, PRIMARY_STORE, b"c2 gained i1".to_vec(), CodecTag::Binary).await.unwrap();

    // Trade B: c1 -> c3, spending the same still-locked item.
    let tx_b = coordinator.begin();
    let conflict = coordinator.enroll_write(tx_b, &c1, PRIMARY_STORE, b"i1 moved to c3".to_vec(), CodecTag::Binary).await.unwrap_err();
    assert_eq!(conflict.kind, ErrorKind::Conflict);

    coordinator.prepare(tx_a).await.unwrap();
    coordinator.commit(tx_a).await.unwrap();
    assert_eq!(coordinator.recover(tx_a).await.unwrap(), Some(TxOutcome::Committed));

    // tx_b never reached `prepare`, so aborting it leaves no durable record.
    coordinator.abort(tx_b).await.unwrap();
    assert_eq!(coordinator.recover(tx_b).await.unwrap(), None);

    let c1_state = backend.read(&c1, PRIMARY_STORE).await.unwrap().unwrap();
    assert_eq!(c1_state.bytes, b"i1 moved to c2");
    let c2_state = backend.read(&c2, PRIMARY_STORE).await.unwrap().unwrap();
    assert_eq!(c2_state.bytes, b"c2 gained i1");
    assert!(backend.read(&c3, PRIMARY_STORE).await.unwrap().is_none());

    // Now that trade A released its locks, a fresh trade against c1 succeeds.
    let tx_c = coordinator.begin();
    coordinator.enroll_write(tx_c, &c1, PRIMARY_STORE, b"i1 moved to c3".to_vec(), CodecTag::Binary).await.unwrap();
    coordinator.prepare(tx_c).await.unwrap();
    coordinator.commit(tx_c).await.unwrap();
    let c1_after = backend.read(&c1, PRIMARY_STORE).await.unwrap().unwrap();
    assert_eq!(c1_after.bytes, b"i1 moved to c3");
}
