//! The per-subscription delivery queue: a
//! bounded FIFO with two overflow policies. `Block` makes `push` wait for
//! room, backpressuring the publisher; `DropOldest` always accepts the
//! newest event, discarding the oldest to make room.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use tokio::sync::Notify;

use crate::event::StreamEvent;

#[derive(Clone, Copy, Eq, PartialEq, Debug)]
pub enum BackpressurePolicy {
    Block,
    DropOldest,
}

#[derive(Clone, Copy, Debug)]
pub struct StreamConfig {
    pub max_pending: usize,
    pub backpressure: BackpressurePolicy,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self { max_pending: 256, backpressure: BackpressurePolicy::Block }
    }
}

pub(crate) struct SubscriberQueue {
    state: Mutex<VecDeque<StreamEvent>>,
    capacity: usize,
    policy: BackpressurePolicy,
    not_empty: Notify,
    not_full: Notify,
    closed: AtomicBool,
}

impl SubscriberQueue {
    pub(crate) fn new(config: StreamConfig) -> Self {
        Self {
            state: Mutex::new(VecDeque::with_capacity(config.max_pending.min(64))),
            capacity: config.max_pending.max(1),
            policy: config.backpressure,
            not_empty: Notify::new(),
            not_full: Notify::new(),
            closed: AtomicBool::new(false),
        }
    }

    /// Enqueues `event`, waiting for room under `Block` or dropping the
    /// oldest pending event under `DropOldest`.
    pub(crate) async fn push(&self, event: StreamEvent) {
        loop {
            {
                let mut q = self.state.lock().unwrap();
                if q.len() < self.capacity {
                    q.push_back(event);
                    self.not_empty.notify_one();
                    return;
                }
                if self.policy == BackpressurePolicy::DropOldest {
                    q.pop_front();
                    q.push_back(event);
                    self.not_empty.notify_one();
                    return;
                }
            }
            self.not_full.notified().await;
        }
    }

    /// Pops the next event, or `None` once the queue is closed and drained.
    pub(crate) async fn pop(&self) -> Option<StreamEvent> {
        loop {
            {
                let mut q = self.state.lock().unwrap();
                if let Some(e) = q.pop_front() {
                    self.not_full.notify_one();
                    return Some(e);
                }
                if self.closed.load(Ordering::Acquire) {
                    return None;
                }
            }
            self.not_empty.notified().await;
        }
    }

    pub(crate) fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.not_empty.notify_waiters();
    }
}
