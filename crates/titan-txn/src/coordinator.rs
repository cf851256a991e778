//! The two-phase commit coordinator.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use titan_primitives::{resolve_slot_name, CellKind, CodecTag, ErrorKind, Identity, Key, Precondition, SlotName, TitanError, TitanResult, TRANSACTION_STORE};
use titan_storage::{Codec, StorageBackend, TextCodec};
use tracing::warn;

use crate::ids::TxId;
use crate::locks::LockTable;
use crate::record::{JournalItem, ParticipantEntry, ParticipantStore, TxOutcome, TxRecord};

const COORDINATOR_KIND: &str = "__TxCoordinator__";

fn coordinator_identity(tx: TxId) -> Identity {
    Identity::new(CellKind::from(COORDINATOR_KIND), Key::string(tx.to_string()))
}

/// Drives one cell storage backend's transactions end to end. One
/// `Coordinator` is shared across every activation on a node, the same way
/// one `CellRuntime` is shared per cell kind — transactions cross cell kinds
/// freely since `backend` is keyed by `Identity`, not by kind.
pub struct Coordinator<B> {
    backend: Arc<B>,
    locks: LockTable,
    journals: DashMap<TxId, Vec<(Identity, JournalItem)>>,
    lock_timeout: Duration,
}

impl<B: StorageBackend> Coordinator<B> {
    pub fn new(backend: Arc<B>) -> Self {
        Self { backend, locks: LockTable::new(), journals: DashMap::new(), lock_timeout: Duration::from_secs(5) }
    }

    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    /// Starts a new transaction. The returned id is the ambient-transaction
    /// token threaded through `CallContext` by cells with `CreateOrJoin`/
    /// `Join` operations.
    pub fn begin(&self) -> TxId {
        let tx = TxId::new();
        self.journals.insert(tx, Vec::new());
        tx
    }

    /// Journals a tentative write against `identity`'s `slot`, taking the
    /// slot's exclusive lock first. The
    /// write is invisible to every other transaction until `commit`.
    pub async fn enroll_write(
        &self,
        tx: TxId,
        identity: &Identity,
        slot: SlotName,
        bytes: Vec<u8>,
        codec: CodecTag,
    ) -> TitanResult<()> {
        self.locks.acquire(identity, slot, tx, self.lock_timeout).await?;
        let item = JournalItem { slot: slot.to_string(), bytes, codec };
        self.journals
            .get_mut(&tx)
            .ok_or_else(|| TitanError::fatal("enroll_write against an unknown transaction"))?
            .push((identity.clone(), item));
        Ok(())
    }

    /// Runs the prepare phase: writes the coordinator's durable `Preparing`
    /// record, then asks every participant to durably vote prepared. Any
    /// participant failure triggers a best-effort abort of the whole
    /// transaction.
    pub async fn prepare(&self, tx: TxId) -> TitanResult<()> {
        let entries = self
            .journals
            .get(&tx)
            .ok_or_else(|| TitanError::fatal("prepare against an unknown transaction"))?
            .value()
            .clone();

        let mut by_participant: HashMap<Identity, Vec<JournalItem>> = HashMap::new();
        for (identity, item) in entries {
            by_participant.entry(identity).or_default().push(item);
        }
        let participants: Vec<Identity> = by_participant.keys().cloned().collect();

        let coord_id = coordinator_identity(tx);
        let record = TxRecord::preparing(participants);
        let bytes = TextCodec::encode(&record)?;
        self.backend
            .write(&coord_id, TRANSACTION_STORE, bytes, CodecTag::Text, Precondition::MustNotExist)
            .await?;

        for (identity, journal) in &by_participant {
            if let Err(e) = self.mark_participant_prepared(identity, tx, journal.clone()).await {
                warn!(%identity, tx = %tx, error = %e, "participant failed to prepare; aborting transaction");
                self.abort(tx).await.ok();
                return Err(e);
            }
        }
        Ok(())
    }

    async fn mark_participant_prepared(&self, identity: &Identity, tx: TxId, journal: Vec<JournalItem>) -> TitanResult<()> {
        loop {
            let existing = self.backend.read(identity, TRANSACTION_STORE).await?;
            let (mut store, precondition) = match existing {
                Some(rec) => (TextCodec::decode::<ParticipantStore>(&rec.bytes)?, Precondition::Exactly(rec.etag)),
                None => (ParticipantStore::default(), Precondition::MustNotExist),
            };
            store.entries.insert(tx, ParticipantEntry { journal: journal.clone(), prepared: true });
            let bytes = TextCodec::encode(&store)?;
            match self.backend.write(identity, TRANSACTION_STORE, bytes, CodecTag::Text, precondition).await {
                Ok(_) => return Ok(()),
                Err(e) if e.kind == ErrorKind::Conflict => continue,
                Err(e) => return Err(e),
            }
        }
    }

    /// Writes the commit record, applies every journaled mutation to its
    /// primary slot, and releases locks. Mutations
    /// are applied with `Precondition::Any` since the coordinator already
    /// holds the exclusive lock proving no one else touched the slot since
    /// `enroll_write` observed it.
    pub async fn commit(&self, tx: TxId) -> TitanResult<()> {
        let entries = self.journals.remove(&tx).map(|(_, v)| v).unwrap_or_default();
        self.set_outcome(tx, TxOutcome::Committed).await?;
        for (identity, item) in &entries {
            let slot = resolve_slot_name(&item.slot)
                .ok_or_else(|| TitanError::fatal(format!("unknown slot name in journal: {}", item.slot)))?;
            self.backend
                .write(identity, slot, item.bytes.clone(), item.codec, Precondition::Any)
                .await?;
        }
        for (identity, _) in &entries {
            self.clear_participant_entry(identity, tx).await.ok();
        }
        self.locks.release_all(tx);
        Ok(())
    }

    /// Writes the abort record, discards journals, and releases locks.
    /// Safe to
    /// call on a transaction that never reached `prepare`.
    pub async fn abort(&self, tx: TxId) -> TitanResult<()> {
        let entries = self.journals.remove(&tx).map(|(_, v)| v).unwrap_or_default();
        self.set_outcome(tx, TxOutcome::Aborted).await.ok();
        for (identity, _) in &entries {
            self.clear_participant_entry(identity, tx).await.ok();
        }
        self.locks.release_all(tx);
        Ok(())
    }

    async fn set_outcome(&self, tx: TxId, outcome: TxOutcome) -> TitanResult<()> {
        let coord_id = coordinator_identity(tx);
        loop {
            let Some(rec) = self.backend.read(&coord_id, TRANSACTION_STORE).await? else {
                // Never prepared (e.g. an empty transaction); nothing to record.
                return Ok(());
            };
            let mut parsed: TxRecord = TextCodec::decode(&rec.bytes)?;
            parsed.outcome = Some(outcome);
            let bytes = TextCodec::encode(&parsed)?;
            match self.backend.write(&coord_id, TRANSACTION_STORE, bytes, CodecTag::Text, Precondition::Exactly(rec.etag)).await {
                Ok(_) => return Ok(()),
                Err(e) if e.kind == ErrorKind::Conflict => continue,
                Err(e) => return Err(e),
            }
        }
    }

    async fn clear_participant_entry(&self, identity: &Identity, tx: TxId) -> TitanResult<()> {
        loop {
            let Some(rec) = self.backend.read(identity, TRANSACTION_STORE).await? else {
                return Ok(());
            };
            let mut store: ParticipantStore = TextCodec::decode(&rec.bytes)?;
            if store.entries.remove(&tx).is_none() {
                return Ok(());
            }
            let bytes = TextCodec::encode(&store)?;
            match self.backend.write(identity, TRANSACTION_STORE, bytes, CodecTag::Text, Precondition::Exactly(rec.etag)).await {
                Ok(_) => return Ok(()),
                Err(e) if e.kind == ErrorKind::Conflict => continue,
                Err(e) => return Err(e),
            }
        }
    }

    /// Polls the coordinator's durable record for a decision, used by a
    /// participant recovering after a crash in the commit window. `None` means the transaction never reached
    /// prepare and any held journal entries should be discarded.
    pub async fn recover(&self, tx: TxId) -> TitanResult<Option<TxOutcome>> {
        let coord_id = coordinator_identity(tx);
        match self.backend.read(&coord_id, TRANSACTION_STORE).await? {
            Some(rec) => {
                let parsed: TxRecord = TextCodec::decode(&rec.bytes)?;
                Ok(parsed.outcome)
            }
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use titan_primitives::{CellKind as CK, Key as K};
    use titan_storage::SledBackend;

    fn backend() -> Arc<SledBackend> {
        let dir = tempfile::tempdir().unwrap();
        let db = sled::open(dir.path()).unwrap();
        std::mem::forget(dir);
        Arc::new(SledBackend::open(&db, "txn-test").unwrap())
    }

    fn account(name: &str) -> Identity {
        Identity::new(CK::from("Account"), K::string(name))
    }

    #[tokio::test]
    async fn commit_applies_every_journaled_write() {
        let backend = backend();
        let coordinator = Coordinator::new(Arc::clone(&backend));
        let tx = coordinator.begin();
        coordinator
            .enroll_write(tx, &account("alice"), "PrimaryStore", b"balance:90".to_vec(), CodecTag::Binary)
            .await
            .unwrap();
        coordinator
            .enroll_write(tx, &account("bob"), "PrimaryStore", b"balance:110".to_vec(), CodecTag::Binary)
            .await
            .unwrap();

        coordinator.prepare(tx).await.unwrap();
        coordinator.commit(tx).await.unwrap();

        let alice = backend.read(&account("alice"), "PrimaryStore").await.unwrap().unwrap();
        assert_eq!(alice.bytes, b"balance:90");
        let bob = backend.read(&account("bob"), "PrimaryStore").await.unwrap().unwrap();
        assert_eq!(bob.bytes, b"balance:110");

        assert_eq!(coordinator.recover(tx).await.unwrap(), Some(TxOutcome::Committed));
    }

    #[tokio::test]
    async fn abort_discards_journal_without_touching_primary_slot() {
        let backend = backend();
        let coordinator = Coordinator::new(Arc::clone(&backend));
        let tx = coordinator.begin();
        coordinator
            .enroll_write(tx, &account("carol"), "PrimaryStore", b"balance:0".to_vec(), CodecTag::Binary)
            .await
            .unwrap();
        coordinator.prepare(tx).await.unwrap();
        coordinator.abort(tx).await.unwrap();

        assert!(backend.read(&account("carol"), "PrimaryStore").await.unwrap().is_none());
        assert_eq!(coordinator.recover(tx).await.unwrap(), Some(TxOutcome::Aborted));
    }

    #[tokio::test]
    async fn overlapping_transactions_serialize_on_shared_slot() {
        let backend = backend();
        let coordinator = Arc::new(Coordinator::new(backend).with_lock_timeout(Duration::from_millis(100)));
        let tx_a = coordinator.begin();
        coordinator
            .enroll_write(tx_a, &account("shared"), "PrimaryStore", b"a".to_vec(), CodecTag::Binary)
            .await
            .unwrap();

        let tx_b = coordinator.begin();
        let err = coordinator
            .enroll_write(tx_b, &account("shared"), "PrimaryStore", b"b".to_vec(), CodecTag::Binary)
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::Conflict);

        coordinator.prepare(tx_a).await.unwrap();
        coordinator.commit(tx_a).await.unwrap();

        // Now that tx_a released the lock, tx_b can enroll the same slot.
        coordinator
            .enroll_write(tx_b, &account("shared"), "PrimaryStore", b"b".to_vec(), CodecTag::Binary)
            .await
            .unwrap();
    }
}
