//! The inbound side of cross-node call forwarding. Hosts
//! `/internal/cells/:kind`: decodes a `ForwardEnvelope` built by a peer's
//! `HttpTransport`, runs it through the local invocation path for whichever
//! cell kind the peer named, and hands back the bincode-encoded
//! `TitanResult<Vec<u8>>` verbatim. Not exposed to browser clients; mounted
//! alongside the public HTTP surface on the same listener.

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
