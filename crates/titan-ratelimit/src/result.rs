//! The outcome of a single rate-limit check.

/// Whether a call is allowed, and if not, how long the caller should wait.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LimitDecision {
    pub allowed: bool,
    pub retry_after_seconds: Option<u64>,
    /// A short machine-readable label for the rule that produced this
    /// decision, suitable for a response header (e.g. `"default/60s"`).
    pub state_header: String,
}

impl LimitDecision {
    pub fn allow(state_header: impl Into<String>) -> Self {
        Self { allowed: true, retry_after_seconds: None, state_header: state_header.into() }
    }

    pub fn deny(retry_after_seconds: u64, state_header: impl Into<String>) -> Self {
        Self { allowed: false, retry_after_seconds: Some(retry_after_seconds), state_header: state_header.into() }
    }
}
