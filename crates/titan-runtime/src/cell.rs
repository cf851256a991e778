//! The cell trait: the unit of identity, state, and
//! serialized execution. Modeled on `host/module_host.rs`'s
//! activate/update/exit dance, but generic over a single Rust type per
//! cell kind rather than a dynamically-typed WASM module.

use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use titan_primitives::{Identity, TitanResult};

use crate::context::CallContext;
use crate::timer::TimerId;

/// Declares how an operation should interact with an ambient transaction.
#[derive(Clone, Copy, Eq, PartialEq, Debug)]
pub enum TransactionalIntent {
    /// Runs outside any transaction.
    NotTransactional,
    /// Starts a new transaction if the caller has none, otherwise joins the
    /// caller's ambient transaction.
    CreateOrJoin,
    /// Must be called with an ambient transaction already in progress.
    Join,
    /// Explicitly excluded from an ambient transaction even if the caller
    /// has one (its effects are never rolled back with the rest).
    Suppress,
}

/// A virtual actor: an addressable, stateful entity with its own mailbox.
/// One [`crate::runtime::CellRuntime`] manages all
/// activations of a single `Cell` implementation.
#[async_trait]
pub trait Cell: Send + 'static {
    /// The input type carrying every operation this cell kind exposes, plus
    /// timer firings funneled back through [`Cell::on_timer`]. Serializable
    /// so a call can be forwarded to the node that actually owns the
    /// identity when it differs from the caller's.
    type Call: Send + 'static + Serialize + DeserializeOwned;
    /// The output type of a successful `handle` call. Serializable for the
    /// same reason as `Call`.
    type Reply: Send + 'static + Serialize + DeserializeOwned;

    /// Used as the `CellKind` component of every identity of this kind.
    fn kind() -> &'static str;

    fn new(identity: Identity) -> Self;

    /// Runs before the first invocation on a fresh activation. May read
    /// state slots. A failure aborts the activation; the runtime retries
    /// elsewhere (bounded) and the in-flight caller sees an error.
    async fn on_activate(&mut self, ctx: &CallContext<Self>) -> TitanResult<()>
    where
        Self: Sized;

    /// Runs after the last in-flight invocation completes, on passivation
    /// or orderly shutdown. Must be idempotent; state writes made during the
    /// session have already been flushed, so this is not required to write.
    async fn on_deactivate(&mut self) -> TitanResult<()> {
        Ok(())
    }

    /// Executes one operation. Invocations against the same activation are
    /// strictly serialized by the runtime's mailbox.
    async fn handle(&mut self, call: Self::Call, ctx: &CallContext<Self>) -> TitanResult<Self::Reply>
    where
        Self: Sized;

    /// Maps a fired timer to a call to run through the mailbox, serialized
    /// with ordinary operations. Returning `None`
    /// drops the tick.
    fn on_timer(&mut self, _timer: TimerId) -> Option<Self::Call> {
        None
    }

    /// Whether a nested call back into this same identity is permitted
    /// while an outer call on it is in flight.
    fn is_interleavable(_call: &Self::Call) -> bool {
        false
    }

    fn transactional_intent(_call: &Self::Call) -> TransactionalIntent {
        TransactionalIntent::NotTransactional
    }

    /// Idle interval after which the activation passivates.
    fn idle_timeout() -> Duration {
        Duration::from_secs(600)
    }

    /// Stateless-worker cell kinds permit several co-located replicas of the
    /// same identity for read fan-out.
    /// Such cells must not rely on state carried across calls.
    fn is_stateless_worker() -> bool {
        false
    }
}
