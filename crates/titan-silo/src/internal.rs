//! The inbound side of cross-node call forwarding. Hosts
//! `/internal/cells/:kind` on the same admin listener as `health::router`:
//! decodes a `ForwardEnvelope` built by a peer's `HttpTransport`, runs it
//! through the local invocation path for whichever cell kind the peer
//! named, and hands back the bincode-encoded `TitanResult<Vec<u8>>`
//! verbatim.

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::post;
use axum::Router;
use titan_primitives::TitanResult;
use titan_runtime::{ForwardEnvelope, ForwardableRuntime};
use tower_http::trace::TraceLayer;

#[derive(Clone)]
pub struct InternalState {
    pub routes: Arc<HashMap<&'static str, Arc<dyn ForwardableRuntime>>>,
}

pub fn router(state: InternalState) -> Router {
    Router::new().route("/internal/cells/:kind", post(receive)).layer(TraceLayer::new_for_http()).with_state(state)
}

async fn receive(State(state): State<InternalState>, Path(kind): Path<String>, body: axum::body::Bytes) -> (StatusCode, Vec<u8>) {
    let envelope: ForwardEnvelope = match bincode::deserialize(&body) {
        Ok(e) => e,
        Err(_) => return (StatusCode::BAD_REQUEST, Vec::new()),
    };
    let Some(runtime) = state.routes.get(kind.as_str()) else {
        return (StatusCode::NOT_FOUND, Vec::new());
    };
    let result: TitanResult<Vec<u8>> = runtime.receive(&envelope.identity, envelope.payload).await;
    match bincode::serialize(&result) {
        Ok(bytes) => (StatusCode::OK, bytes),
        Err(_) => (StatusCode::INTERNAL_SERVER_ERROR, Vec::new()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use titan_domain::{Account, AccountCall};
    use titan_primitives::{CellKind, Identity, Key};
    use tower::ServiceExt;
    use uuid::Uuid;

    use crate::registry;

    fn state() -> InternalState {
        registry::init_for_test();
        InternalState { routes: registry::forward_routes() }
    }

    #[tokio::test]
    async fn forwarded_call_for_an_unhosted_kind_is_rejected() {
        let _guard = registry::TEST_GUARD.lock().unwrap();
        let app = router(state());
        let identity = Identity::new(CellKind::from("NoSuchKind"), Key::string("x1"));
        let body = bincode::serialize(&ForwardEnvelope { identity, payload: Vec::new() }).unwrap();
        let res = app.oneshot(Request::post("/internal/cells/NoSuchKind").body(Body::from(body)).unwrap()).await.unwrap();
        assert_eq!(res.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn malformed_envelope_is_rejected() {
        let _guard = registry::TEST_GUARD.lock().unwrap();
        let app = router(state());
        let res = app.oneshot(Request::post("/internal/cells/Account").body(Body::from(vec![0xff, 0x00])).unwrap()).await.unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn forwarded_call_for_a_hosted_kind_is_serviced_locally() {
        let _guard = registry::TEST_GUARD.lock().unwrap();
        let app = router(state());
        let identity = Account::identity_for(Uuid::new_v4());
        let payload = bincode::serialize(&AccountCall::GetProfile).unwrap();
        let body = bincode::serialize(&ForwardEnvelope { identity, payload }).unwrap();

        let res = app.oneshot(Request::post("/internal/cells/Account").body(Body::from(body)).unwrap()).await.unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
        let result: TitanResult<Vec<u8>> = bincode::deserialize(&bytes).unwrap();
        let _reply: titan_domain::AccountState = bincode::deserialize(&result.unwrap()).unwrap();
    }
}
