//! The admin/health surface: liveness for orchestrators, plus a read-only
//! snapshot of cluster membership and this node's active cell counts.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use serde_json::{json, Value};
use titan_directory::Directory;
use tower_http::trace::TraceLayer;

use crate::registry;

#[derive(Clone)]
pub struct HealthState {
    pub directory: Arc<Directory>,
    pub failure_timeout: Duration,
}

pub fn router(state: HealthState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/admin/nodes", get(nodes))
        .route("/admin/cells", get(cells))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn healthz() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

#[derive(Serialize)]
struct NodeSummary {
    #[serde(rename = "nodeId")]
    node_id: String,
    endpoints: Vec<String>,
    incarnation: u64,
}

async fn nodes(State(state): State<HealthState>) -> Json<Value> {
    match state.directory.live_nodes(state.failure_timeout) {
        Ok(records) => {
            let nodes: Vec<NodeSummary> = records
                .into_iter()
                .map(|r| NodeSummary { node_id: r.node_id.to_string(), endpoints: r.endpoints, incarnation: r.incarnation })
                .collect();
            Json(json!({ "nodes": nodes }))
        }
        Err(e) => Json(json!({ "error": e.to_string() })),
    }
}

async fn cells() -> Json<Value> {
    Json(json!({
        "account": registry::account().active_count(),
        "character": registry::character().active_count(),
        "inventory": registry::inventory().active_count(),
        "trade": registry::trade().active_count(),
        "season": registry::season().active_count(),
        "baseType": registry::base_type().active_count(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use titan_directory::DirectoryConfig;
    use tower::ServiceExt;

    fn state() -> HealthState {
        let dir = tempfile::tempdir().unwrap();
        let db = sled::open(dir.path()).unwrap();
        std::mem::forget(dir);
        let directory = Arc::new(Directory::open(&db, DirectoryConfig::default()).unwrap());
        let node = titan_directory::NodeId::new();
        directory.heartbeat(&node, vec!["127.0.0.1:9190".into()]).unwrap();
        HealthState { directory, failure_timeout: Duration::from_secs(15) }
    }

    #[tokio::test]
    async fn healthz_reports_ok() {
        let app = router(state());
        let res = app.oneshot(Request::get("/healthz").body(Body::empty()).unwrap()).await.unwrap();
        assert_eq!(res.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn admin_nodes_lists_the_live_heartbeat() {
        let app = router(state());
        let res = app.oneshot(Request::get("/admin/nodes").body(Body::empty()).unwrap()).await.unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        let body = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
        let parsed: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(parsed["nodes"].as_array().unwrap().len(), 1);
    }
}
