//! The storage backend contract. `read`/`write`/`clear` are
//! idempotent given the etag: `write`/`clear` take a [`Precondition`] on the
//! slot's current etag and fail with `Conflict` if it does not hold.

use async_trait::async_trait;
use titan_primitives::{CodecTag, Etag, Identity, Precondition, SlotName, TitanError};

/// What was stored under a slot, plus the codec it was written with.
#[derive(Clone, Debug)]
pub struct StoredRecord {
    pub bytes: Vec<u8>,
    pub etag: Etag,
    pub codec: CodecTag,
}

/// A durable key/value backend scoped to `(cellKind, key, slotName)` triples.
/// Implementations must be safe to share across worker threads: the cell
/// runtime pools one backend per node and acquires/releases per call.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    async fn read(&self, cell: &Identity, slot: SlotName) -> Result<Option<StoredRecord>, TitanError>;

    async fn write(
        &self,
        cell: &Identity,
        slot: SlotName,
        bytes: Vec<u8>,
        codec: CodecTag,
        expected: Precondition,
    ) -> Result<Etag, TitanError>;

    async fn clear(&self, cell: &Identity, slot: SlotName, expected: Precondition) -> Result<(), TitanError>;
}
