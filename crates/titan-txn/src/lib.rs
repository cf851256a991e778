//! Titan's cross-cell transaction coordinator: two-phase
//! commit over arbitrary storage-backed participants, with exclusive slot
//! locks standing in for the execute-phase isolation and a durable,
//! independently recoverable outcome record modeled on `control_db.rs`'s
//! read-modify-write-with-CAS idiom, generalized from a single control
//! database to an arbitrary set of participant cells.

pub mod coordinator;
pub mod ids;
pub mod locks;
pub mod record;

pub use coordinator::Coordinator;
pub use ids::TxId;
pub use locks::LockTable;
pub use record::{JournalItem, ParticipantEntry, ParticipantStore, TxOutcome, TxRecord};
