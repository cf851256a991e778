//! Titan's pub/sub stream substrate: at-least-once
//! delivery, per-stream FIFO, and configurable backpressure, modeled on
//! `client_connection.rs`'s pattern of a per-client outbound queue feeding
//! a dedicated delivery task.

pub mod durable;
pub mod event;
pub mod id;
pub mod memory;
pub mod queue;
pub mod subscriber;

pub use durable::DurableSubscriptions;
pub use event::StreamEvent;
pub use id::{StreamId, SubscriptionId};
pub use memory::{MemoryProvider, SubscriptionHandle};
pub use queue::{BackpressurePolicy, StreamConfig};
pub use subscriber::Subscriber;
