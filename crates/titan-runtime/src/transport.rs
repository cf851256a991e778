//! Cross-node call forwarding. When the directory places an identity on a
//! node other than the one a [`crate::runtime::CellRuntime`] is running on,
//! the runtime hands the call to a `RemoteTransport` instead of failing
//! outright. [`HttpTransport`] is the one real implementation: a loopback
//! HTTP client that resolves the target's published endpoint from the
//! directory and POSTs the encoded call to its internal forwarding route.

use async_trait::async_trait;
use titan_directory::{Directory, NodeId};
use titan_primitives::{Identity, TitanError, TitanResult};

/// Forwards an already-encoded call to `node` and returns its
/// already-encoded reply. Implementations own the wire format between the
/// encoded bytes `CellRuntime` hands them and whatever sits on the other
/// end of the wire; `HttpTransport` and the `/internal/cells/:kind` route it
/// expects to find on the target node agree on bincode-encoded envelopes.
#[async_trait]
pub trait RemoteTransport: Send + Sync {
    async fn forward(&self, node: &NodeId, kind: &'static str, identity: &Identity, payload: Vec<u8>) -> TitanResult<Vec<u8>>;
}

/// The envelope carried in both directions of the wire: the identity the
/// call targets alongside the bincode-encoded `Cell::Call`/`Cell::Reply`.
/// Bundling the identity means the URL only needs to name the cell kind.
#[derive(serde::Serialize, serde::Deserialize)]
pub struct ForwardEnvelope {
    pub identity: Identity,
    pub payload: Vec<u8>,
}

/// A node's dynamically-dispatched entry point for an inbound forwarded
/// call: decode the payload as this cell kind's `Call`, run it through the
/// ordinary local invocation path, and encode the reply. Implemented once,
/// generically, for every `CellRuntime<T>` so a silo or gateway binary can
/// build a `HashMap<&'static str, Arc<dyn ForwardableRuntime>>` keyed by
/// `T::kind()` without naming every concrete `T` in its HTTP layer.
#[async_trait]
pub trait ForwardableRuntime: Send + Sync {
    async fn receive(&self, identity: &Identity, payload: Vec<u8>) -> TitanResult<Vec<u8>>;
}

#[async_trait]
impl<T: crate::cell::Cell> ForwardableRuntime for crate::runtime::CellRuntime<T> {
    async fn receive(&self, identity: &Identity, payload: Vec<u8>) -> TitanResult<Vec<u8>> {
        let call: T::Call = bincode::deserialize(&payload).map_err(|e| TitanError::fatal(format!("failed to decode forwarded call: {e}")))?;
        let chain: crate::context::CallChain = std::sync::Arc::new(vec![identity.clone()]);
        let reply = self.invoke(identity, call, chain, None).await?;
        bincode::serialize(&reply).map_err(|e| TitanError::fatal(format!("failed to encode forwarded reply: {e}")))
    }
}

/// A loopback RPC client: looks up the target node's published endpoint in
/// the directory and POSTs to its `/internal/cells/:kind` route. This is
/// the one real transport in this workspace (see `DESIGN.md` for why no
/// richer protocol was built); it is sufficient to route a call to whichever
/// node the directory says actually owns the identity, rather than dead-end
/// on a permanently `Transient` error.
pub struct HttpTransport {
    directory: std::sync::Arc<Directory>,
    failure_timeout: std::time::Duration,
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new(directory: std::sync::Arc<Directory>, failure_timeout: std::time::Duration) -> Self {
        Self { directory, failure_timeout, client: reqwest::Client::new() }
    }
}

#[async_trait]
impl RemoteTransport for HttpTransport {
    async fn forward(&self, node: &NodeId, kind: &'static str, identity: &Identity, payload: Vec<u8>) -> TitanResult<Vec<u8>> {
        let live = self
            .directory
            .live_nodes(self.failure_timeout)
            .map_err(|e| TitanError::transient(format!("directory lookup failed while forwarding to {node}: {e}")))?;
        let record = live
            .into_iter()
            .find(|r| r.node_id == *node)
            .ok_or_else(|| TitanError::transient(format!("node {node} has no live heartbeat to forward to")))?;
        let endpoint = record
            .endpoints
            .first()
            .ok_or_else(|| TitanError::transient(format!("node {node} published no endpoint to forward to")))?;

        let envelope = ForwardEnvelope { identity: identity.clone(), payload };
        let body = bincode::serialize(&envelope).map_err(|e| TitanError::fatal(format!("failed to encode forwarding envelope: {e}")))?;

        let url = format!("http://{endpoint}/internal/cells/{kind}");
        let response = self
            .client
            .post(&url)
            .body(body)
            .send()
            .await
            .map_err(|e| TitanError::transient(format!("forwarding request to {node} failed: {e}")))?;
        let bytes = response
            .bytes()
            .await
            .map_err(|e| TitanError::transient(format!("failed to read forwarded response from {node}: {e}")))?;
        let result: TitanResult<Vec<u8>> =
            bincode::deserialize(&bytes).map_err(|e| TitanError::fatal(format!("failed to decode forwarded response from {node}: {e}")))?;
        result
    }
}
