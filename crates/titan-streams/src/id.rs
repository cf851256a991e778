//! Stream and subscription identity.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A named stream, scoped by provider and namespace so unrelated subsystems
/// (e.g. a season's trade feed vs. a presence feed) never collide on key.
#[derive(Clone, Eq, PartialEq, Hash, Serialize, Deserialize, Debug)]
pub struct StreamId {
    pub provider: Arc<str>,
    pub namespace: Arc<str>,
    pub key: Arc<str>,
}

impl StreamId {
    pub fn new(provider: impl Into<Arc<str>>, namespace: impl Into<Arc<str>>, key: impl Into<Arc<str>>) -> Self {
        Self { provider: provider.into(), namespace: namespace.into(), key: key.into() }
    }
}

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.provider, self.namespace, self.key)
    }
}

#[derive(Clone, Copy, Eq, PartialEq, Hash, Serialize, Deserialize, Debug)]
pub struct SubscriptionId(pub Uuid);

impl SubscriptionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SubscriptionId {
    fn default() -> Self {
        Self::new()
    }
}
