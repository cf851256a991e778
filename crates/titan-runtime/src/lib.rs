//! Titan's virtual-actor cell runtime: on-demand
//! activation, single-threaded per-identity mailboxes, timers, and the
//! reentrancy rules that govern nested calls. Follows the module-host
//! lifecycle (`host/host_controller.rs`, `host/module_host.rs`) and
//! scheduler (`host/scheduler.rs`) pattern, generalized from one dynamically
//! loaded WASM module per database to one statically typed `Cell` impl per
//! kind, with many concurrently activated identities.

pub mod activation;
pub mod caller;
pub mod cell;
pub mod context;
pub mod mailbox;
pub mod runtime;
pub mod timer;
pub mod transport;

pub use caller::{CallKindCheck, CallerStub};
pub use cell::{Cell, TransactionalIntent};
pub use context::{call_self, CallChain, CallContext};
pub use mailbox::Inbound;
pub use runtime::CellRuntime;
pub use timer::{spawn_timer, TimerHandle, TimerId, TimerSpec};
pub use transport::{ForwardEnvelope, ForwardableRuntime, HttpTransport, RemoteTransport};
