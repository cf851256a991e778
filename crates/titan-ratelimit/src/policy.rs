//! Rate-limit policies and endpoint→policy lookup. Policies and their
//! mappings live in a singleton store and are resolved by glob pattern,
//! falling back to a declared default.

use std::time::Duration;

use glob::Pattern;
use serde::{Deserialize, Serialize};

/// One sliding-window rule within a policy: at most `max_hits` within
/// `period`, imposing `timeout` once exceeded.
#[derive(Clone, Serialize, Deserialize, Debug)]
pub struct RuleSpec {
    pub max_hits: u32,
    pub period: Duration,
    pub timeout: Duration,
}

#[derive(Clone, Serialize, Deserialize, Debug)]
pub struct PolicySpec {
    pub name: String,
    pub rules: Vec<RuleSpec>,
}

/// Endpoint pattern → policy name, matched in declaration order so earlier,
/// more specific patterns can shadow later, broader ones.
#[derive(Clone, Serialize, Deserialize, Debug)]
pub struct EndpointMapping {
    pub pattern: String,
    pub policy: String,
}

#[derive(Clone, Serialize, Deserialize, Debug, Default)]
pub struct PolicyRegistry {
    pub policies: Vec<PolicySpec>,
    pub mappings: Vec<EndpointMapping>,
    pub default_policy: Option<String>,
}

impl PolicyRegistry {
    pub fn policy_for_endpoint(&self, endpoint: &str) -> Option<&PolicySpec> {
        let name = self
            .mappings
            .iter()
            .find(|m| Pattern::new(&m.pattern).map(|p| p.matches(endpoint)).unwrap_or(false))
            .map(|m| m.policy.as_str())
            .or(self.default_policy.as_deref())?;
        self.policies.iter().find(|p| p.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> PolicyRegistry {
        PolicyRegistry {
            policies: vec![
                PolicySpec {
                    name: "admin".into(),
                    rules: vec![RuleSpec { max_hits: 5, period: Duration::from_secs(60), timeout: Duration::from_secs(300) }],
                },
                PolicySpec {
                    name: "default".into(),
                    rules: vec![RuleSpec { max_hits: 100, period: Duration::from_secs(60), timeout: Duration::from_secs(10) }],
                },
            ],
            mappings: vec![EndpointMapping { pattern: "/admin/*".into(), policy: "admin".into() }],
            default_policy: Some("default".into()),
        }
    }

    #[test]
    fn glob_match_wins_over_default() {
        let r = registry();
        assert_eq!(r.policy_for_endpoint("/admin/users").unwrap().name, "admin");
    }

    #[test]
    fn unmatched_endpoint_falls_back_to_default() {
        let r = registry();
        assert_eq!(r.policy_for_endpoint("/trade/offer").unwrap().name, "default");
    }
}
