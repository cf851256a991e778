//! Per-invocation context threaded through `Cell::handle`.
//! Carries the call chain used for reentrancy detection and the deadline
//! used for cancellation.

use std::sync::Arc;
use std::time::Instant;

use titan_primitives::{ErrorKind, Identity, TitanError, TitanResult};

use crate::cell::Cell;

/// The chain of identities from the root call down to the current one, used
/// to detect reentrancy.
pub type CallChain = Arc<Vec<Identity>>;

pub struct CallContext<T: Cell + ?Sized> {
    pub identity: Identity,
    pub chain: CallChain,
    pub deadline: Option<Instant>,
    _marker: std::marker::PhantomData<fn() -> T>,
}

impl<T: Cell> CallContext<T> {
    pub fn root(identity: Identity, deadline: Option<Instant>) -> Self {
        let chain = Arc::new(vec![identity.clone()]);
        Self { identity, chain, deadline, _marker: std::marker::PhantomData }
    }

    pub(crate) fn with_chain(identity: Identity, chain: CallChain, deadline: Option<Instant>) -> Self {
        Self { identity, chain, deadline, _marker: std::marker::PhantomData }
    }

    pub fn child_chain(&self, target: &Identity) -> CallChain {
        let mut next = (*self.chain).clone();
        next.push(target.clone());
        Arc::new(next)
    }

    pub fn has_expired(&self) -> bool {
        self.deadline.map(|d| Instant::now() > d).unwrap_or(false)
    }

    /// True if `target` already appears in the call chain — i.e. invoking it
    /// now would be a reentrant call.
    pub fn is_reentrant(&self, target: &Identity) -> bool {
        self.chain.iter().any(|i| i == target)
    }

    /// Builds the [`CallContext`] for a same-identity reentrant call. Used
    /// only by [`crate::caller::call_self`], which enforces that the
    /// operation is marked interleavable before recursing.
    pub(crate) fn reentrant(&self) -> Self {
        Self {
            identity: self.identity.clone(),
            chain: self.child_chain(&self.identity),
            deadline: self.deadline,
            _marker: std::marker::PhantomData,
        }
    }
}

/// Calls `cell` reentrantly with `call`, recursing directly on the already-
/// held `&mut T` rather than going back through the mailbox (which would
/// deadlock: the mailbox loop that owns `cell` is the very task suspended
/// here). Only valid for operations the cell marks `is_interleavable`;
/// otherwise this returns a `Fatal` error without ever touching `cell`.
pub async fn call_self<T: Cell>(cell: &mut T, call: T::Call, ctx: &CallContext<T>) -> TitanResult<T::Reply> {
    if !T::is_interleavable(&call) {
        return Err(TitanError::new(
            ErrorKind::Fatal,
            "reentrant call into non-interleavable operation is not permitted",
        ));
    }
    let nested = ctx.reentrant();
    Box::pin(cell.handle(call, &nested)).await
}
