//! The sliding-window engine: an in-process governor-backed counter per
//! `(policy, partition, rule)` key, backstopped by a durable "timed out
//! until" marker so a timeout survives a node restart and is visible to
//! every node sharing the same storage backend.
//!
//! The in-process counter is not itself shared across nodes — each node
//! keeps its own governor state — so the durable marker is what makes a
//! timeout cluster-wide: once one node trips a rule, it persists the
//! timeout, and every node consults that record before falling through to
//! its local counter.

use std::num::NonZeroU32;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use dashmap::DashMap;
use governor::{DefaultKeyedRateLimiter, Quota};
use titan_primitives::{CellKind, CodecTag, ErrorKind, Identity, Key, Precondition, SlotName, TitanResult};
use titan_storage::{Codec, StorageBackend, TextCodec};

use crate::policy::{PolicySpec, RuleSpec};
use crate::result::LimitDecision;
use crate::store::CachedPolicyStore;

const TIMEOUT_SLOT: SlotName = "RateLimitTimeout";

fn timeout_identity(policy: &str, partition: &str, rule_index: usize) -> Identity {
    Identity::new(CellKind::from("__RateLimitTimeout__"), Key::string(format!("{policy}:{partition}:{rule_index}")))
}

#[derive(serde::Serialize, serde::Deserialize, Default, Clone)]
struct TimeoutRecord {
    until_epoch_millis: u64,
}

fn now_millis() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_millis() as u64
}

fn quota_for(rule: &RuleSpec) -> Option<Quota> {
    let max_hits = NonZeroU32::new(rule.max_hits)?;
    let per_cell = rule.period.checked_div(rule.max_hits)?;
    let per_cell = if per_cell.is_zero() { Duration::from_nanos(1) } else { per_cell };
    Some(Quota::with_period(per_cell)?.allow_burst(max_hits))
}

struct RuleLimiter {
    limiter: DefaultKeyedRateLimiter<String>,
    timeout: Duration,
}

/// A process-local sliding-window limiter layered over durable timeout
/// bookkeeping. One instance is shared across all calls on a node.
pub struct RateLimiter<B> {
    policies: CachedPolicyStore<B>,
    backend: Arc<B>,
    rule_limiters: DashMap<(String, usize), Arc<RuleLimiter>>,
    epoch: AtomicU64,
}

impl<B: StorageBackend> RateLimiter<B> {
    pub fn new(backend: Arc<B>, policy_cache_ttl: Duration) -> Self {
        Self {
            policies: CachedPolicyStore::new(Arc::clone(&backend), policy_cache_ttl),
            backend,
            rule_limiters: DashMap::new(),
            epoch: AtomicU64::new(0),
        }
    }

    fn rule_limiter(&self, policy: &PolicySpec, rule_index: usize, rule: &RuleSpec) -> Option<Arc<RuleLimiter>> {
        let key = (policy.name.clone(), rule_index);
        if let Some(existing) = self.rule_limiters.get(&key) {
            return Some(Arc::clone(existing.value()));
        }
        let quota = quota_for(rule)?;
        let limiter = Arc::new(RuleLimiter { limiter: DefaultKeyedRateLimiter::keyed(quota), timeout: rule.timeout });
        self.rule_limiters.insert(key, Arc::clone(&limiter));
        Some(limiter)
    }

    /// Checks whether `partition` (e.g. an account id) may call `endpoint`
    /// right now, consulting every rule of the resolved policy in order and
    /// stopping at the first that denies.
    pub async fn check(&self, endpoint: &str, partition: &str) -> TitanResult<LimitDecision> {
        let registry = self.policies.get().await?;
        let Some(policy) = registry.policy_for_endpoint(endpoint) else {
            return Ok(LimitDecision::allow("unrestricted"));
        };

        for (rule_index, rule) in policy.rules.iter().enumerate() {
            if let Some(active) = self.active_timeout(&policy.name, partition, rule_index).await? {
                let retry_after = active.saturating_sub(now_millis()) / 1000 + 1;
                return Ok(LimitDecision::deny(retry_after, format!("{}/rule{rule_index}", policy.name)));
            }

            let Some(rule_limiter) = self.rule_limiter(policy, rule_index, rule) else {
                continue; // a zero-hit rule admits nothing to check against; skip it
            };
            if rule_limiter.limiter.check_key(&partition.to_string()).is_err() {
                let until = now_millis() + rule_limiter.timeout.as_millis() as u64;
                self.record_timeout(&policy.name, partition, rule_index, until).await?;
                return Ok(LimitDecision::deny(rule_limiter.timeout.as_secs().max(1), format!("{}/rule{rule_index}", policy.name)));
            }
        }

        self.epoch.fetch_add(1, Ordering::Relaxed);
        Ok(LimitDecision::allow(policy.name.clone()))
    }

    async fn active_timeout(&self, policy: &str, partition: &str, rule_index: usize) -> TitanResult<Option<u64>> {
        let identity = timeout_identity(policy, partition, rule_index);
        let Some(record) = self.backend.read(&identity, TIMEOUT_SLOT).await? else {
            return Ok(None);
        };
        let parsed: TimeoutRecord = TextCodec::decode(&record.bytes)?;
        if parsed.until_epoch_millis > now_millis() {
            Ok(Some(parsed.until_epoch_millis))
        } else {
            Ok(None)
        }
    }

    async fn record_timeout(&self, policy: &str, partition: &str, rule_index: usize, until_epoch_millis: u64) -> TitanResult<()> {
        let identity = timeout_identity(policy, partition, rule_index);
        loop {
            let existing = self.backend.read(&identity, TIMEOUT_SLOT).await?;
            let precondition = match &existing {
                Some(rec) => Precondition::Exactly(rec.etag.clone()),
                None => Precondition::MustNotExist,
            };
            let bytes = TextCodec::encode(&TimeoutRecord { until_epoch_millis })?;
            match self.backend.write(&identity, TIMEOUT_SLOT, bytes, CodecTag::Text, precondition).await {
                Ok(_) => return Ok(()),
                Err(e) if e.kind() == ErrorKind::Conflict => continue,
                Err(e) => return Err(e),
            }
        }
    }
}
