//! Wall-clock timestamps used for heartbeats, leases, tickets, and
//! transaction deadlines. Modeled on `host/timestamp.rs`'s newtype-over-millis
//! approach, but backed by `chrono` for readable serialization in the
//! self-describing codec.

use std::ops::Add;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize, Debug)]
pub struct Timestamp(DateTime<Utc>);

impl Timestamp {
    pub fn now() -> Self {
        Self(Utc::now())
    }

    pub fn from_chrono(dt: DateTime<Utc>) -> Self {
        Self(dt)
    }

    pub fn as_chrono(&self) -> DateTime<Utc> {
        self.0
    }

    pub fn is_past(&self) -> bool {
        self.0 <= Utc::now()
    }

    pub fn duration_since_now(&self) -> Option<Duration> {
        (self.0 - Utc::now()).to_std().ok()
    }
}

impl Add<Duration> for Timestamp {
    type Output = Timestamp;

    fn add(self, rhs: Duration) -> Timestamp {
        Timestamp(self.0 + chrono::Duration::from_std(rhs).unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn future_timestamp_is_not_past() {
        let t = Timestamp::now() + Duration::from_secs(60);
        assert!(!t.is_past());
    }
}
