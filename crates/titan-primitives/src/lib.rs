//! Shared vocabulary for the Titan cell runtime: identity, state-slot
//! primitives, timestamps, and the closed error-kind taxonomy. Every other
//! Titan crate depends on this one and nothing here depends on them.

pub mod error;
pub mod identity;
pub mod slot;
pub mod time;

pub use error::{ErrorKind, TitanError, TitanResult};
pub use identity::{CellKind, Identity, Key};
pub use slot::{resolve_slot_name, CodecTag, Etag, Precondition, SlotName, PRIMARY_STORE, TRANSACTION_STORE};
pub use time::Timestamp;
