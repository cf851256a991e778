//! The literal login + ticketed connect handshake: a client logs in over
//! HTTP, exchanges its session for a one-time connection ticket, and that
//! exact ticket gates the stream connection exactly once — the same
//! consumption [`ws::handle_socket`] performs before ever reading a frame.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use serde_json::{json, Value};
use tower::ServiceExt;

use titan_gateway::auth::{ticket, AuthProvider, MockProvider, SessionConfig, SessionStore};
use titan_gateway::cells::Backend;
use titan_gateway::http::{router, AppState};
use titan_ratelimit::RateLimiter;
use titan_storage::{RetryConfig, SledBackend};

fn state() -> AppState {
    let dir = tempfile::tempdir().unwrap();
    let db = sled::open(dir.path()).unwrap();
    std::mem::forget(dir);
    let backend = Arc::new(Backend::new(SledBackend::open(&db, "login-connect-test").unwrap(), RetryConfig::default()));

    let mut providers: HashMap<&'static str, Arc<dyn AuthProvider>> = HashMap::new();
    providers.insert("Mock", Arc::new(MockProvider));

    AppState {
        rate_limiter: Arc::new(RateLimiter::new(Arc::clone(&backend), Duration::from_secs(60))),
        backend,
        sessions: Arc::new(SessionStore::new(SessionConfig::default())),
        providers: Arc::new(providers),
        ticket_ttl: Duration::from_secs(30),
    }
}

#[tokio::test]
async fn login_then_ticket_gates_the_connection_exactly_once() {
    let state = state();
    let app = router(state.clone());

    let login_res = app
        .clone()
        .oneshot(
            Request::post("/auth/login")
                .header("content-type", "application/json")
                .body(Body::from(json!({"token": "mock:trader-1", "provider": "Mock"}).to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(login_res.status(), StatusCode::OK);
    let login_body = axum::body::to_bytes(login_res.into_body(), usize::MAX).await.unwrap();
    let login: Value = serde_json::from_slice(&login_body).unwrap();
    let session_id = login["sessionId"].as_str().unwrap().to_string();
    let user_id = login["userId"].as_str().unwrap().to_string();

    let ticket_res = app
        .oneshot(
            Request::post("/auth/connection-ticket")
                .header("Authorization", format!("Bearer {session_id}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(ticket_res.status(), StatusCode::OK);
    let ticket_body = axum::body::to_bytes(ticket_res.into_body(), usize::MAX).await.unwrap();
    let parsed: Value = serde_json::from_slice(&ticket_body).unwrap();
    let ticket_id = parsed["ticket"].as_str().unwrap().to_string();

    // This is exactly what `ws::handle_socket` does with the ticket query
    // parameter before the socket is allowed to send or receive any frame.
    let principal = ticket::consume(state.backend.as_ref(), &ticket_id).await.unwrap();
    assert_eq!(principal.user_id.to_string(), user_id);

    let reconnect_attempt = ticket::consume(state.backend.as_ref(), &ticket_id).await;
    assert!(reconnect_attempt.is_err(), "a consumed ticket must never gate a second connection");
}

#[tokio::test]
async fn a_ticket_issued_for_one_session_does_not_leak_into_an_unauthenticated_request() {
    let state = state();
    let app = router(state);

    let res = app.oneshot(Request::post("/auth/connection-ticket").body(Body::empty()).unwrap()).await.unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
}
