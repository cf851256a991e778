//! Pluggable auth providers, modeled on the `TokenValidator`/
//! `FullTokenValidator` split in `core/src/auth/token_validation.rs`: a
//! provider validates an opaque token string and returns the principal it
//! identifies, without the gateway needing to know whether that meant
//! checking a JWKS, a platform API, or (here) a dev-mode mock.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::GatewayError;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AuthenticatedPrincipal {
    pub user_id: Uuid,
    pub roles: Vec<String>,
}

#[async_trait]
pub trait AuthProvider: Send + Sync {
    fn name(&self) -> &'static str;
    async fn validate(&self, token: &str) -> Result<AuthenticatedPrincipal, GatewayError>;
}

/// Accepts tokens of the form `mock:<uuid-or-name>`, deriving a stable user
/// id from the suffix. Intended for local development and the end-to-end
/// test scenarios, never for a production deployment.
pub struct MockProvider;

#[async_trait]
impl AuthProvider for MockProvider {
    fn name(&self) -> &'static str {
        "Mock"
    }

    async fn validate(&self, token: &str) -> Result<AuthenticatedPrincipal, GatewayError> {
        let suffix = token
            .strip_prefix("mock:")
            .ok_or_else(|| GatewayError::BadRequest("mock tokens must be of the form mock:<subject>".into()))?;
        let user_id = Uuid::new_v5(&Uuid::NAMESPACE_OID, suffix.as_bytes());
        Ok(AuthenticatedPrincipal { user_id, roles: vec!["player".into()] })
    }
}

#[async_trait]
impl<T: AuthProvider + ?Sized> AuthProvider for std::sync::Arc<T> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    async fn validate(&self, token: &str) -> Result<AuthenticatedPrincipal, GatewayError> {
        (**self).validate(token).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn mock_provider_derives_a_stable_user_id_from_the_subject() {
        let provider = MockProvider;
        let a = provider.validate("mock:abcd").await.unwrap();
        let b = provider.validate("mock:abcd").await.unwrap();
        assert_eq!(a.user_id, b.user_id);
    }

    #[tokio::test]
    async fn mock_provider_rejects_tokens_without_the_prefix() {
        let provider = MockProvider;
        assert!(provider.validate("abcd").await.is_err());
    }
}
