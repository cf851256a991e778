//! Stream-connection hub dispatch: one WebSocket per connection, carrying a
//! JSON request/response envelope per call and server-originated push
//! events over the same socket. Both travel through one outbound channel
//! drained by a single writer task, so a connection's send ordering is
//! never interleaved between a reply and a push frame mid-encode.
//!
//! A connection authenticates by consuming a connection ticket during the
//! upgrade (never a session id or bearer token on the wire), then every
//! subsequent frame names a hub and method the way a line-oriented reducer protocol does.

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::Response;
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use titan_domain::{AccountCall, BaseTypeCall, BaseTypeDef, Character, CharacterCall, InventoryCall, SeasonCall, Trade, TradeCall};
use titan_primitives::{CellKind, Identity, Key, TitanError};
use titan_runtime::{Cell, CallChain};
use titan_streams::StreamId;
use tracing::warn;
use uuid::Uuid;

use crate::auth::{ticket, AuthenticatedPrincipal};
use crate::cells;
use crate::error::GatewayError;
use crate::groups::ConnectionGroups;
use crate::http::AppState;
use crate::presence::PresenceCall;
use crate::session_log::{SessionLogCall, SessionLogEntry};

#[derive(Deserialize)]
pub struct StreamQuery {
    pub ticket: String,
}

#[derive(Deserialize)]
struct HubRequest {
    #[serde(rename = "requestId")]
    request_id: String,
    hub: String,
    method: String,
    #[serde(default)]
    args: Value,
}

#[derive(Serialize)]
struct HubResponse {
    #[serde(rename = "requestId")]
    request_id: String,
    ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(rename = "retryAfterSeconds", skip_serializing_if = "Option::is_none")]
    retry_after_seconds: Option<u64>,
}

enum Outbound {
    Response(HubResponse),
    Push { seq: u64, payload: Vec<u8> },
}

pub async fn stream_upgrade(ws: WebSocketUpgrade, Query(query): Query<StreamQuery>, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, query.ticket, state))
}

async fn handle_socket(socket: WebSocket, ticket_id: String, state: AppState) {
    let principal = match ticket::consume(state.backend.as_ref(), &ticket_id).await {
        Ok(p) => p,
        Err(e) => {
            let (mut sender, _) = socket.split();
            let _ = sender.send(Message::Text(json!({"error": e.to_string()}).to_string())).await;
            return;
        }
    };

    let presence_id = crate::presence::PlayerPresence::identity_for(principal.user_id);
    let presence_chain: CallChain = Arc::new(vec![presence_id.clone()]);
    let count = cells::presence().invoke(&presence_id, PresenceCall::Connect, presence_chain.clone(), None).await.unwrap_or(0);
    if count == 1 {
        let log_id = crate::session_log::SessionLog::identity_for(principal.user_id);
        let entry = SessionLogEntry { session_id: ticket_id.clone(), provider: "Mock".into(), connected_at_millis: now_millis() };
        let chain: CallChain = Arc::new(vec![log_id.clone()]);
        let _ = cells::session_log().invoke(&log_id, SessionLogCall::Append(entry), chain, None).await;
    }

    let (out_tx, mut out_rx) = tokio::sync::mpsc::unbounded_channel::<Outbound>();
    let (push_tx, mut push_rx) = tokio::sync::mpsc::unbounded_channel();
    let groups = ConnectionGroups::new(cells::streams(), push_tx);

    let (mut sender, mut receiver) = socket.split();

    let forward_tx = out_tx.clone();
    let push_forward = tokio::spawn(async move {
        while let Some(event) = push_rx.recv().await {
            if forward_tx.send(Outbound::Push { seq: event.seq, payload: event.payload }).is_err() {
                break;
            }
        }
    });

    let writer = tokio::spawn(async move {
        while let Some(outbound) = out_rx.recv().await {
            let frame = match outbound {
                Outbound::Response(r) => serde_json::to_string(&r).unwrap_or_else(|_| json!({"error": "encode failure"}).to_string()),
                Outbound::Push { seq, payload } => json!({ "push": true, "seq": seq, "payload": String::from_utf8_lossy(&payload) }).to_string(),
            };
            if sender.send(Message::Text(frame)).await.is_err() {
                break;
            }
        }
    });

    while let Some(Ok(msg)) = receiver.next().await {
        let Message::Text(text) = msg else { continue };
        let request: HubRequest = match serde_json::from_str(&text) {
            Ok(r) => r,
            Err(e) => {
                warn!(error = %e, "malformed hub request frame");
                continue;
            }
        };
        let response = match dispatch(&state, &principal, &groups, &request).await {
            Ok(result) => HubResponse { request_id: request.request_id, ok: true, result: Some(result), error: None, retry_after_seconds: None },
            Err(e) => HubResponse {
                request_id: request.request_id,
                ok: false,
                result: None,
                error: Some(e.to_string()),
                retry_after_seconds: match &e {
                    GatewayError::Titan(t) => t.retry_after.map(|d| d.as_secs()),
                    _ => None,
                },
            },
        };
        if out_tx.send(Outbound::Response(response)).is_err() {
            break;
        }
    }

    groups.leave_all();
    push_forward.abort();
    drop(out_tx);
    let _ = writer.await;
    let _ = cells::presence().invoke(&presence_id, PresenceCall::Disconnect, presence_chain, None).await;
}

async fn dispatch(state: &AppState, principal: &AuthenticatedPrincipal, groups: &ConnectionGroups, req: &HubRequest) -> Result<Value, GatewayError> {
    let endpoint = format!("{}.{}", req.hub, req.method);
    let decision = state.rate_limiter.check(&endpoint, &principal.user_id.to_string()).await?;
    if !decision.allowed {
        let retry = Duration::from_secs(decision.retry_after_seconds.unwrap_or(1));
        return Err(GatewayError::Titan(TitanError::rate_limited(retry)));
    }

    match (req.hub.as_str(), req.method.as_str()) {
        ("AccountHub", "getProfile") => {
            let id = titan_domain::Account::identity_for(principal.user_id);
            let reply = invoke(cells::account(), &id, AccountCall::GetProfile).await?;
            Ok(serde_json::to_value(reply).unwrap())
        }
        ("AccountHub", "setDisplayName") => {
            let name: String = arg(req, "displayName")?;
            let id = titan_domain::Account::identity_for(principal.user_id);
            let reply = invoke(cells::account(), &id, AccountCall::SetDisplayName(name)).await?;
            Ok(serde_json::to_value(reply).unwrap())
        }
        ("CharacterHub", "create") => {
            let name: String = arg(req, "name")?;
            let season: String = arg(req, "season")?;
            let hardcore: bool = arg(req, "hardcore").unwrap_or(false);
            let id = Character::identity_for(principal.user_id, &season, &name);
            let reply = invoke(cells::character(), &id, CharacterCall::Create { account_id: principal.user_id, name, season, hardcore }).await?;
            Ok(serde_json::to_value(reply).unwrap())
        }
        ("CharacterHub", "die") => {
            let name: String = arg(req, "name")?;
            let season: String = arg(req, "season")?;
            let id = Character::identity_for(principal.user_id, &season, &name);
            let reply = invoke(cells::character(), &id, CharacterCall::Die).await?;
            Ok(serde_json::to_value(reply).unwrap())
        }
        ("CharacterHub", "getHistory") => {
            let name: String = arg(req, "name")?;
            let season: String = arg(req, "season")?;
            let id = Character::identity_for(principal.user_id, &season, &name);
            let reply = invoke(cells::character(), &id, CharacterCall::GetHistory).await?;
            Ok(serde_json::to_value(reply).unwrap())
        }
        ("InventoryHub", "list") => {
            let character: Identity = character_identity_arg(req)?;
            let id = titan_domain::Inventory::identity_for(&character);
            let reply = invoke(cells::inventory(), &id, InventoryCall::List).await?;
            Ok(serde_json::to_value(reply).unwrap())
        }
        ("TradeHub", "startTrade") => {
            let my_char: Identity = identity_arg(req, "myCharId")?;
            let other_char: Identity = identity_arg(req, "otherCharId")?;
            let season: String = arg(req, "seasonId")?;
            let trade_id = Uuid::new_v4();
            let id = Trade::identity_for(trade_id);
            let reply = invoke(cells::trade(), &id, TradeCall::Start { season, participants: [my_char, other_char] }).await?;
            groups.join(StreamId::new("trade", reply.season.clone(), trade_id.to_string()));
            Ok(json!({ "tradeId": trade_id, "state": reply }))
        }
        ("TradeHub", "addItem") => {
            let trade_id: Uuid = arg(req, "tradeId")?;
            let participant_index: usize = arg(req, "participantIndex")?;
            let item: Uuid = arg(req, "item")?;
            let id = Trade::identity_for(trade_id);
            let reply = invoke(cells::trade(), &id, TradeCall::AddItem { participant_index, item }).await?;
            Ok(serde_json::to_value(reply).unwrap())
        }
        ("TradeHub", "accept") => {
            let trade_id: Uuid = arg(req, "tradeId")?;
            let participant_index: usize = arg(req, "participantIndex")?;
            let id = Trade::identity_for(trade_id);
            let reply = invoke(cells::trade(), &id, TradeCall::Accept { participant_index }).await?;
            Ok(serde_json::to_value(reply).unwrap())
        }
        ("TradeHub", "get") => {
            let trade_id: Uuid = arg(req, "tradeId")?;
            let id = Trade::identity_for(trade_id);
            let reply = invoke(cells::trade(), &id, TradeCall::Get).await?;
            Ok(serde_json::to_value(reply).unwrap())
        }
        ("SeasonHub", "declare") => {
            let name: String = arg(req, "name")?;
            let hardcore: bool = arg(req, "hardcore").unwrap_or(false);
            let void: bool = arg(req, "void").unwrap_or(false);
            let fallback: Option<String> = arg(req, "fallback").ok();
            let id = titan_domain::Season::identity_for(&name);
            let reply = invoke(cells::season(), &id, SeasonCall::Declare { hardcore, void, fallback }).await?;
            Ok(serde_json::to_value(reply).unwrap())
        }
        ("SeasonHub", "get") => {
            let name: String = arg(req, "name")?;
            let id = titan_domain::Season::identity_for(&name);
            let reply = invoke(cells::season(), &id, SeasonCall::Get).await?;
            Ok(serde_json::to_value(reply).unwrap())
        }
        ("BaseTypeHub", "register") => {
            let name: String = arg(req, "name")?;
            let tradeable: bool = arg(req, "tradeable").unwrap_or(true);
            let reply = invoke(cells::base_type(), &registry_identity(), BaseTypeCall::Register(BaseTypeDef { name, tradeable })).await?;
            Ok(serde_json::to_value(reply).unwrap())
        }
        ("BaseTypeHub", "lookup") => {
            let name: String = arg(req, "name")?;
            let reply = invoke(cells::base_type(), &registry_identity(), BaseTypeCall::Lookup(name)).await?;
            Ok(serde_json::to_value(reply).unwrap())
        }
        ("AuthHub", "whoAmI") => Ok(json!({ "userId": principal.user_id, "roles": principal.roles })),
        ("AuthHub", "subscribe") => {
            let stream: String = arg(req, "stream")?;
            let (namespace, key) = stream.split_once(':').unwrap_or((stream.as_str(), ""));
            groups.join(StreamId::new("trade", namespace.to_string(), key.to_string()));
            Ok(json!({ "subscribed": stream }))
        }
        _ => Err(GatewayError::BadRequest(format!("unknown hub method {}.{}", req.hub, req.method))),
    }
}

fn registry_identity() -> Identity {
    Identity::new(CellKind::from("BaseTypeRegistry"), Key::string("global"))
}

async fn invoke<T: Cell>(runtime: Arc<titan_runtime::CellRuntime<T>>, identity: &Identity, call: T::Call) -> Result<T::Reply, GatewayError> {
    let chain: CallChain = Arc::new(vec![identity.clone()]);
    let deadline = Some(Instant::now() + DEFAULT_HUB_CALL_TIMEOUT);
    runtime.invoke(identity, call, chain, deadline).await.map_err(GatewayError::from)
}

const DEFAULT_HUB_CALL_TIMEOUT: Duration = Duration::from_secs(10);

fn arg<T: serde::de::DeserializeOwned>(req: &HubRequest, field: &str) -> Result<T, GatewayError> {
    req.args
        .get(field)
        .cloned()
        .ok_or_else(|| GatewayError::BadRequest(format!("missing argument {field}")))
        .and_then(|v| serde_json::from_value(v).map_err(|e| GatewayError::BadRequest(e.to_string())))
}

/// Parses a character reference off the wire, formatted `accountId/season/name`
/// — the same three components `Character::identity_for` keys a character
/// cell by (`Key::Compound(accountId, "season/name")`), so the identity built
/// here resolves to the exact cell a `CharacterHub.create` call activated.
fn identity_arg(req: &HubRequest, field: &str) -> Result<Identity, GatewayError> {
    let raw: String = arg(req, field)?;
    let (account_id, season_and_name) =
        raw.split_once('/').ok_or_else(|| GatewayError::BadRequest(format!("{field} must be formatted as accountId/season/name")))?;
    let account_id = Uuid::parse_str(account_id).map_err(|_| GatewayError::BadRequest(format!("{field} has an invalid account id")))?;
    if season_and_name.is_empty() || !season_and_name.contains('/') {
        return Err(GatewayError::BadRequest(format!("{field} must be formatted as accountId/season/name")));
    }
    Ok(Identity::new(CellKind::from("Character"), Key::compound(account_id, season_and_name)))
}

fn character_identity_arg(req: &HubRequest) -> Result<Identity, GatewayError> {
    identity_arg(req, "characterId")
}

fn now_millis() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_millis() as u64
}
