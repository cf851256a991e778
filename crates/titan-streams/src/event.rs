//! A delivered event: an opaque payload plus the monotonic per-stream
//! sequence number a subscriber can use to detect the duplicate redelivery
//! that at-least-once permits.

use serde::{Deserialize, Serialize};

#[derive(Clone, Serialize, Deserialize, Debug)]
pub struct StreamEvent {
    pub seq: u64,
    pub payload: Vec<u8>,
}
