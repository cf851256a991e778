//! Glob-matched, per-partition sliding-window rate limiting with a durable,
//! cluster-visible timeout marker.

mod limiter;
mod policy;
mod result;
mod store;

pub use limiter::RateLimiter;
pub use policy::{EndpointMapping, PolicyRegistry, PolicySpec, RuleSpec};
pub use result::LimitDecision;
pub use store::{CachedPolicyStore, PolicyStore};
