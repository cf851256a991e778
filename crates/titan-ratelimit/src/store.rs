//! The singleton policy store and the short-lived client-side cache that
//! limiter instances consult instead of hitting storage on every call.

use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use titan_primitives::{CellKind, CodecTag, Identity, Key, Precondition, SlotName, TitanResult};
use titan_storage::{Codec, StorageBackend, TextCodec};

use crate::policy::PolicyRegistry;

const POLICY_SLOT: SlotName = "RateLimitPolicy";

fn singleton_identity() -> Identity {
    Identity::new(CellKind::from("__RateLimitPolicy__"), Key::string("global"))
}

pub struct PolicyStore<B> {
    backend: Arc<B>,
}

impl<B: StorageBackend> PolicyStore<B> {
    pub fn new(backend: Arc<B>) -> Self {
        Self { backend }
    }

    pub async fn load(&self) -> TitanResult<PolicyRegistry> {
        match self.backend.read(&singleton_identity(), POLICY_SLOT).await? {
            Some(rec) => TextCodec::decode(&rec.bytes),
            None => Ok(PolicyRegistry::default()),
        }
    }

    /// Replaces the registry outright. Callers needing a read-modify-write
    /// (e.g. adding one mapping) should `load`, mutate, then `replace`,
    /// retrying on `Conflict` the same way the transaction journal does.
    pub async fn replace(&self, registry: &PolicyRegistry) -> TitanResult<()> {
        let existing = self.backend.read(&singleton_identity(), POLICY_SLOT).await?;
        let precondition = match existing {
            Some(rec) => Precondition::Exactly(rec.etag),
            None => Precondition::MustNotExist,
        };
        let bytes = TextCodec::encode(registry)?;
        self.backend.write(&singleton_identity(), POLICY_SLOT, bytes, CodecTag::Text, precondition).await?;
        Ok(())
    }
}

/// Caches the last-loaded [`PolicyRegistry`] for `ConfigCacheSeconds` so a
/// rate-limit check on the hot path doesn't read storage per call.
pub struct CachedPolicyStore<B> {
    store: PolicyStore<B>,
    ttl: Duration,
    cached: RwLock<Option<(PolicyRegistry, Instant)>>,
}

impl<B: StorageBackend> CachedPolicyStore<B> {
    pub fn new(backend: Arc<B>, ttl: Duration) -> Self {
        Self { store: PolicyStore::new(backend), ttl, cached: RwLock::new(None) }
    }

    pub async fn get(&self) -> TitanResult<PolicyRegistry> {
        if let Some((registry, loaded_at)) = self.cached.read().unwrap().clone() {
            if loaded_at.elapsed() < self.ttl {
                return Ok(registry);
            }
        }
        let fresh = self.store.load().await?;
        *self.cached.write().unwrap() = Some((fresh.clone(), Instant::now()));
        Ok(fresh)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::{EndpointMapping, PolicySpec, RuleSpec};
    use titan_storage::SledBackend;

    fn backend() -> Arc<SledBackend> {
        let dir = tempfile::tempdir().unwrap();
        let db = sled::open(dir.path()).unwrap();
        std::mem::forget(dir);
        Arc::new(SledBackend::open(&db, "ratelimit-policy").unwrap())
    }

    #[tokio::test]
    async fn replace_then_load_round_trips() {
        let store = PolicyStore::new(backend());
        let registry = PolicyRegistry {
            policies: vec![PolicySpec {
                name: "default".into(),
                rules: vec![RuleSpec { max_hits: 10, period: Duration::from_secs(1), timeout: Duration::from_secs(1) }],
            }],
            mappings: vec![EndpointMapping { pattern: "*".into(), policy: "default".into() }],
            default_policy: Some("default".into()),
        };
        store.replace(&registry).await.unwrap();
        let loaded = store.load().await.unwrap();
        assert_eq!(loaded.policies.len(), 1);
    }

    #[tokio::test]
    async fn cache_serves_stale_reads_within_ttl() {
        let backend = backend();
        let cached = CachedPolicyStore::new(Arc::clone(&backend), Duration::from_secs(60));
        let first = cached.get().await.unwrap();
        assert!(first.policies.is_empty());

        let store = PolicyStore::new(Arc::clone(&backend));
        let registry = PolicyRegistry {
            policies: vec![PolicySpec { name: "default".into(), rules: vec![] }],
            mappings: vec![],
            default_policy: None,
        };
        store.replace(&registry).await.unwrap();

        // Still within TTL: cache must not observe the write yet.
        let second = cached.get().await.unwrap();
        assert!(second.policies.is_empty());
    }
}
