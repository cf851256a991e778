//! Durable records written to the `TransactionStore` slot: a per-participant journal of tentative mutations, and a
//! coordinator-side outcome record that any participant can poll during
//! crash recovery.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use titan_primitives::{CodecTag, Identity};

use crate::ids::TxId;

/// One tentative write, captured with enough information to replay it
/// against the primary slot at commit time without re-deriving it from
/// application logic.
#[derive(Clone, Serialize, Deserialize, Debug)]
pub struct JournalItem {
    pub slot: String,
    pub bytes: Vec<u8>,
    pub codec: CodecTag,
}

/// A participant's bookkeeping for one transaction, keyed by [`TxId`] inside
/// that participant's `TransactionStore` slot so concurrent unrelated
/// transactions on the same cell don't collide on the slot name.
#[derive(Clone, Serialize, Deserialize, Debug)]
pub struct ParticipantEntry {
    pub journal: Vec<JournalItem>,
    pub prepared: bool,
}

/// The full contents of one participant's `TransactionStore` slot: every
/// transaction this cell currently has journaled mutations for.
#[derive(Clone, Serialize, Deserialize, Debug, Default)]
pub struct ParticipantStore {
    pub entries: HashMap<TxId, ParticipantEntry>,
}

#[derive(Clone, Copy, Eq, PartialEq, Serialize, Deserialize, Debug)]
pub enum TxOutcome {
    Committed,
    Aborted,
}

/// The coordinator's own durable record for one transaction, stored under a
/// synthetic identity keyed by the transaction id so it is reachable from
/// any node without routing through a particular cell.
#[derive(Clone, Serialize, Deserialize, Debug)]
pub struct TxRecord {
    pub participants: Vec<Identity>,
    pub outcome: Option<TxOutcome>,
}

impl TxRecord {
    pub fn preparing(participants: Vec<Identity>) -> Self {
        Self { participants, outcome: None }
    }
}
