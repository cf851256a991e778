//! The per-activation mailbox: a FIFO channel that serializes every call,
//! timer firing, and lease-fencing shutdown against one cell instance.

use std::time::Instant;

use tokio::sync::oneshot;
use titan_primitives::TitanResult;

use crate::cell::Cell;
use crate::context::CallChain;
use crate::timer::TimerId;

pub enum Inbound<T: Cell> {
    Call {
        call: T::Call,
        reply: oneshot::Sender<TitanResult<T::Reply>>,
        chain: CallChain,
        deadline: Option<Instant>,
    },
    Timer(TimerId),
    /// The directory fenced this activation out (lease lost to another
    /// node) or an administrative eviction occurred; the activation must
    /// deactivate and exit without completing further calls.
    Fenced,
}
