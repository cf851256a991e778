//! Titan's storage layer: a small backend contract, two
//! codecs, a transient-fault retry wrapper, and a `sled`-backed
//! implementation modeled on the pattern of `db/ostorage` backends and its
//! use of `sled` for the control database.

pub mod backend;
pub mod codec;
pub mod retry;
pub mod sled_backend;
pub mod slot_store;

pub use backend::{StorageBackend, StoredRecord};
pub use codec::{BinaryCodec, Codec, TextCodec};
pub use retry::{RetryConfig, RetryingBackend};
pub use sled_backend::SledBackend;
pub use slot_store::TypedSlot;
