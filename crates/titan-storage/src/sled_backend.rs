//! A `sled`-backed [`StorageBackend`] modeled on the pattern of use of
//! `sled` as its embedded KV (see `control_db.rs`, `host/scheduler.rs`).
//! Etags are the tree's own CAS-compatible byte value, so `write`/`clear`
//! preconditions are enforced by a single atomic `compare_and_swap` rather
//! than a read-then-write race.

use async_trait::async_trait;
use titan_primitives::{CodecTag, Etag, Identity, Precondition, SlotName, TitanError};

use crate::backend::{StorageBackend, StoredRecord};

fn tree_key(cell: &Identity, slot: SlotName) -> Vec<u8> {
    let mut k = cell.to_bytes();
    k.push(0xffu8);
    k.extend_from_slice(slot.as_bytes());
    k
}

/// Envelope stored as the tree value: `codec tag byte || payload`.
fn encode_value(codec: CodecTag, bytes: &[u8]) -> Vec<u8> {
    let tag = match codec {
        CodecTag::Binary => 0u8,
        CodecTag::Text => 1u8,
    };
    let mut v = Vec::with_capacity(1 + bytes.len());
    v.push(tag);
    v.extend_from_slice(bytes);
    v
}

fn decode_value(raw: &[u8]) -> Result<(CodecTag, &[u8]), TitanError> {
    let (tag_byte, payload) = raw
        .split_first()
        .ok_or_else(|| TitanError::fatal("corrupt storage record: empty envelope"))?;
    let codec = match tag_byte {
        0 => CodecTag::Binary,
        1 => CodecTag::Text,
        other => return Err(TitanError::fatal(format!("corrupt storage record: unknown codec tag {other}"))),
    };
    Ok((codec, payload))
}

pub struct SledBackend {
    tree: sled::Tree,
}

impl SledBackend {
    pub fn open(db: &sled::Db, tree_name: &str) -> Result<Self, TitanError> {
        let tree = db
            .open_tree(tree_name)
            .map_err(|e| TitanError::fatal(format!("failed to open sled tree {tree_name}: {e}")))?;
        Ok(Self { tree })
    }
}

#[async_trait]
impl StorageBackend for SledBackend {
    async fn read(&self, cell: &Identity, slot: SlotName) -> Result<Option<StoredRecord>, TitanError> {
        let key = tree_key(cell, slot);
        let tree = self.tree.clone();
        tokio::task::spawn_blocking(move || {
            let Some(raw) = tree.get(&key).map_err(|e| TitanError::transient(format!("sled read failed: {e}")))?
            else {
                return Ok(None);
            };
            let (codec, payload) = decode_value(&raw)?;
            Ok(Some(StoredRecord {
                bytes: payload.to_vec(),
                etag: Etag::from_bytes(raw.to_vec()),
                codec,
            }))
        })
        .await
        .map_err(|e| TitanError::fatal(format!("storage task panicked: {e}")))?
    }

    async fn write(
        &self,
        cell: &Identity,
        slot: SlotName,
        bytes: Vec<u8>,
        codec: CodecTag,
        expected: Precondition,
    ) -> Result<Etag, TitanError> {
        let key = tree_key(cell, slot);
        let new_value = encode_value(codec, &bytes);
        let tree = self.tree.clone();
        let new_value_for_cas = new_value.clone();
        let cell_display = cell.to_string();
        let outcome = tokio::task::spawn_blocking(move || -> Result<(), TitanError> {
            let old: Option<Vec<u8>> = match expected {
                Precondition::MustNotExist => None,
                Precondition::Exactly(etag) => Some(etag.0),
                Precondition::Any => {
                    tree.insert(&key, new_value_for_cas)
                        .map_err(|e| TitanError::transient(format!("sled write failed: {e}")))?;
                    return Ok(());
                }
            };
            match tree.compare_and_swap(&key, old, Some(new_value_for_cas)) {
                Ok(Ok(())) => Ok(()),
                Ok(Err(_)) => Err(TitanError::conflict(format!("etag mismatch on {cell_display}/{slot}"))),
                Err(e) => Err(TitanError::transient(format!("sled cas failed: {e}"))),
            }
        })
        .await
        .map_err(|e| TitanError::fatal(format!("storage task panicked: {e}")))?;
        outcome?;
        self.tree.flush_async().await.map_err(|e| TitanError::transient(format!("sled flush failed: {e}")))?;
        Ok(Etag::from_bytes(new_value))
    }

    async fn clear(&self, cell: &Identity, slot: SlotName, expected: Precondition) -> Result<(), TitanError> {
        let key = tree_key(cell, slot);
        let tree = self.tree.clone();
        let cell_display = cell.to_string();
        let outcome = tokio::task::spawn_blocking(move || -> Result<(), TitanError> {
            match expected {
                Precondition::Any => {
                    tree.remove(&key).map_err(|e| TitanError::transient(format!("sled remove failed: {e}")))?;
                    Ok(())
                }
                Precondition::MustNotExist => Err(TitanError::invalid_input("clear requires an existing etag")),
                Precondition::Exactly(etag) => match tree.compare_and_swap(&key, Some(etag.0), None::<Vec<u8>>) {
                    Ok(Ok(())) => Ok(()),
                    Ok(Err(_)) => Err(TitanError::conflict(format!("etag mismatch clearing {cell_display}/{slot}"))),
                    Err(e) => Err(TitanError::transient(format!("sled cas failed: {e}"))),
                },
            }
        })
        .await
        .map_err(|e| TitanError::fatal(format!("storage task panicked: {e}")))?;
        outcome?;
        self.tree.flush_async().await.map_err(|e| TitanError::transient(format!("sled flush failed: {e}")))?;
        Ok(())
    }
}
