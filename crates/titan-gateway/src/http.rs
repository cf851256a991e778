//! The HTTP authentication surface: login, logout, provider discovery, and connection-ticket
//! issuance. Every route but `/auth/login` and `/auth/providers` requires
//! `Authorization: Bearer <sessionId>`, resolved here once and handed to
//! the handler as an extractor rather than re-parsed per route.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{FromRequestParts, State};
use axum::http::request::Parts;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{async_trait, Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use titan_ratelimit::RateLimiter;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::auth::{AuthProvider, Session, SessionStore};
use crate::auth::ticket;
use crate::cells::Backend;
use crate::error::GatewayError;
use crate::ws;

#[derive(Clone)]
pub struct AppState {
    pub backend: Arc<Backend>,
    pub rate_limiter: Arc<RateLimiter<Backend>>,
    pub sessions: Arc<SessionStore>,
    pub providers: Arc<HashMap<&'static str, Arc<dyn AuthProvider>>>,
    pub ticket_ttl: Duration,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/auth/login", post(login))
        .route("/auth/logout", post(logout))
        .route("/auth/logout-all", post(logout_all))
        .route("/auth/providers", get(providers))
        .route("/auth/connection-ticket", post(connection_ticket))
        .route("/stream", get(ws::stream_upgrade))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Deserialize)]
struct LoginRequest {
    token: String,
    provider: String,
}

#[derive(Serialize)]
struct LoginResponse {
    success: bool,
    #[serde(rename = "userId")]
    user_id: uuid::Uuid,
    provider: String,
    #[serde(rename = "sessionId")]
    session_id: String,
    #[serde(rename = "expiresAt")]
    expires_at: u64,
}

async fn login(State(state): State<AppState>, Json(req): Json<LoginRequest>) -> Result<Json<Value>, GatewayError> {
    let decision = state.rate_limiter.check("Auth.login", &req.token).await?;
    if !decision.allowed {
        let retry = Duration::from_secs(decision.retry_after_seconds.unwrap_or(1));
        return Err(GatewayError::Titan(titan_primitives::TitanError::rate_limited(retry)));
    }

    let provider = state.providers.get(req.provider.as_str()).ok_or_else(|| GatewayError::UnknownProvider(req.provider.clone()))?;
    let principal = provider.validate(&req.token).await?;
    let session = state.sessions.create(principal.user_id, principal.roles, provider.name());
    Ok(Json(json!(LoginResponse {
        success: true,
        user_id: session.user_id,
        provider: session.provider.clone(),
        session_id: session.session_id.clone(),
        expires_at: session.expires_at.load(std::sync::atomic::Ordering::Relaxed),
    })))
}

async fn logout(State(state): State<AppState>, session: AuthenticatedSession) -> Json<Value> {
    state.sessions.invalidate(&session.0.session_id);
    Json(json!({ "success": true }))
}

async fn logout_all(State(state): State<AppState>, session: AuthenticatedSession) -> Json<Value> {
    let count = state.sessions.invalidate_all(session.0.user_id);
    Json(json!({ "sessionsInvalidated": count }))
}

async fn providers(State(state): State<AppState>) -> Json<Vec<&'static str>> {
    Json(state.providers.keys().copied().collect())
}

async fn connection_ticket(State(state): State<AppState>, session: AuthenticatedSession) -> Result<Json<Value>, GatewayError> {
    let principal = crate::auth::AuthenticatedPrincipal { user_id: session.0.user_id, roles: session.0.roles.clone() };
    let ticket_id = ticket::issue(state.backend.as_ref(), principal, state.ticket_ttl).await?;
    Ok(Json(json!({ "ticket": ticket_id })))
}

/// An extractor that resolves `Authorization: Bearer <sessionId>` against
/// the session store. Required on every route but `/auth/login` and
/// `/auth/providers`.
struct AuthenticatedSession(Session);

#[async_trait]
impl FromRequestParts<AppState> for AuthenticatedSession {
    type Rejection = GatewayError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let header = parts.headers.get(axum::http::header::AUTHORIZATION).and_then(|v| v.to_str().ok()).ok_or(GatewayError::MissingSession)?;
        let session_id = header.strip_prefix("Bearer ").ok_or(GatewayError::MissingSession)?;
        let session = state.sessions.validate(session_id)?;
        Ok(AuthenticatedSession(session))
    }
}

#[allow(dead_code)]
fn assert_status_code_mapping_is_exhaustive(_: StatusCode) {}
