//! Named state slots and the stable type-tag mechanism used in place of
//! reflection-based serialization: each persisted type declares a tag and a
//! codec resolves `tag -> layout` explicitly.

use serde::{Deserialize, Serialize};

/// The name of a state slot, e.g. `"PrimaryStore"`, `"TransactionStore"`.
pub type SlotName = &'static str;

/// The slot every cell's application state lives in, codec-bound to
/// [`CodecTag::Binary`].
pub const PRIMARY_STORE: SlotName = "PrimaryStore";

/// The slot the transaction coordinator persists per-participant journals
/// and prepare votes in, codec-bound to [`CodecTag::Text`] so the record
/// stays legible across schema revisions.
pub const TRANSACTION_STORE: SlotName = "TransactionStore";

/// Resolves a slot name read back from a serialized record (e.g. a
/// transaction journal entry) to the `'static` constant the storage backend
/// expects. Titan only ever persists through the closed set of named slots
/// above; an unrecognized name means the record was written by a newer,
/// incompatible build.
pub fn resolve_slot_name(name: &str) -> Option<SlotName> {
    match name {
        "PrimaryStore" => Some(PRIMARY_STORE),
        "TransactionStore" => Some(TRANSACTION_STORE),
        _ => None,
    }
}

/// An opaque optimistic-concurrency token returned by the storage backend.
/// Callers never construct one except by round-tripping a
/// value already returned by the backend.
#[derive(Clone, Eq, PartialEq, Hash, Serialize, Deserialize, Debug, Default)]
pub struct Etag(pub Vec<u8>);

impl Etag {
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }
}

/// The codec tag persisted alongside each slot's payload, resolved explicitly rather than via runtime
/// type introspection.
#[derive(Clone, Copy, Eq, PartialEq, Serialize, Deserialize, Debug)]
pub enum CodecTag {
    /// Compact binary codec for application state that does not need to
    /// outlive schema changes.
    Binary,
    /// Self-describing text codec for records that may outlive schema
    /// changes, e.g. the transaction log and pub-sub bookkeeping.
    Text,
}

/// A precondition on a slot's current etag, used by `write`/`clear`.
/// `None` is `expectedEtag = none`, meaning "must not
/// exist".
#[derive(Clone, Eq, PartialEq, Debug)]
pub enum Precondition {
    MustNotExist,
    Exactly(Etag),
    /// No optimistic-concurrency check; used by the transaction coordinator
    /// when it already holds an exclusive slot lock.
    Any,
}
