//! The connection ticket cell: a single-use, short-TTL credential that
//! binds a stream connection to the principal that requested it, so the
//! stream URL never needs to carry the session id or a long-lived token.
//! `issue` and `consume` are plain storage reads/writes rather than a full
//! `titan_runtime::Cell`, since a ticket's entire lifecycle is one
//! conditional write guarded by its own identity's etag — no mailbox,
//! activation, or cross-cell call is ever involved.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use titan_primitives::{CellKind, CodecTag, Identity, Key, Precondition, TitanError, TitanResult, PRIMARY_STORE};
use titan_storage::{Codec, StorageBackend, TextCodec};

use super::provider::AuthenticatedPrincipal;

#[derive(Clone, Serialize, Deserialize)]
struct TicketRecord {
    principal: AuthenticatedPrincipal,
    expires_at_millis: u64,
    consumed: bool,
}

fn now_millis() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_millis() as u64
}

fn identity_for(ticket_id: &str) -> Identity {
    Identity::new(CellKind::from("ConnectionTicket"), Key::string(ticket_id))
}

fn random_ticket_id() -> String {
    let mut bytes = [0u8; 18];
    rand::thread_rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Issues a fresh, unconsumed ticket for `principal`, good for `ttl`.
pub async fn issue<B: StorageBackend>(backend: &B, principal: AuthenticatedPrincipal, ttl: Duration) -> TitanResult<String> {
    let ticket_id = random_ticket_id();
    let record = TicketRecord { principal, expires_at_millis: now_millis() + ttl.as_millis() as u64, consumed: false };
    let bytes = TextCodec::encode(&record)?;
    backend.write(&identity_for(&ticket_id), PRIMARY_STORE, bytes, CodecTag::Text, Precondition::MustNotExist).await?;
    Ok(ticket_id)
}

/// Consumes `ticket_id` exactly once: the first caller to win the CAS write
/// marking it consumed gets the principal back; every subsequent caller
/// (including retries of the same request) sees an error, satisfying "at
/// most one successful consumption".
pub async fn consume<B: StorageBackend>(backend: &B, ticket_id: &str) -> TitanResult<AuthenticatedPrincipal> {
    let identity = identity_for(ticket_id);
    loop {
        let Some(rec) = backend.read(&identity, PRIMARY_STORE).await? else {
            return Err(TitanError::unauthorized("unknown or expired connection ticket"));
        };
        let mut record: TicketRecord = TextCodec::decode(&rec.bytes)?;
        if record.consumed {
            return Err(TitanError::unauthorized("connection ticket already consumed"));
        }
        if record.expires_at_millis < now_millis() {
            return Err(TitanError::unauthorized("connection ticket expired"));
        }
        let principal = record.principal.clone();
        record.consumed = true;
        let bytes = TextCodec::encode(&record)?;
        match backend.write(&identity, PRIMARY_STORE, bytes, CodecTag::Text, Precondition::Exactly(rec.etag)).await {
            Ok(_) => return Ok(principal),
            Err(e) if e.kind() == titan_primitives::ErrorKind::Conflict => continue,
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use titan_storage::SledBackend;

    fn backend() -> SledBackend {
        let dir = tempfile::tempdir().unwrap();
        let db = sled::open(dir.path()).unwrap();
        std::mem::forget(dir);
        SledBackend::open(&db, "tickets").unwrap()
    }

    fn principal() -> AuthenticatedPrincipal {
        AuthenticatedPrincipal { user_id: uuid::Uuid::new_v4(), roles: vec!["player".into()] }
    }

    #[tokio::test]
    async fn a_ticket_consumes_exactly_once() {
        let backend = backend();
        let ticket = issue(&backend, principal(), Duration::from_secs(30)).await.unwrap();
        assert!(consume(&backend, &ticket).await.is_ok());
        assert!(consume(&backend, &ticket).await.is_err());
    }

    #[tokio::test]
    async fn an_unknown_ticket_is_rejected() {
        let backend = backend();
        assert!(consume(&backend, "does-not-exist").await.is_err());
    }

    #[tokio::test]
    async fn an_expired_ticket_is_rejected() {
        let backend = backend();
        let ticket = issue(&backend, principal(), Duration::from_millis(1)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(consume(&backend, &ticket).await.is_err());
    }
}
