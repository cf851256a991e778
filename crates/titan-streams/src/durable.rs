//! Durable subscription bookkeeping:
//! which streams a given owner identity is subscribed to, persisted so the
//! owner can re-subscribe its live handler after a restart. The event
//! backlog itself stays in-memory even for durably-bookkept subscriptions —
//! recorded as a deliberate scope simplification rather than a full
//! write-ahead stream log.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use titan_primitives::{CodecTag, ErrorKind, Identity, Precondition, SlotName, TitanResult};
use titan_storage::{Codec, StorageBackend, TextCodec};

use crate::id::StreamId;

const SUBSCRIPTIONS_SLOT: SlotName = "StreamSubscriptions";

#[derive(Clone, Serialize, Deserialize, Debug, Default)]
struct SubscriptionRecord {
    streams: Vec<StreamId>,
}

/// Tracks which streams `owner` is durably subscribed to, independent of
/// any particular provider instance.
pub struct DurableSubscriptions<B> {
    backend: Arc<B>,
}

impl<B: StorageBackend> DurableSubscriptions<B> {
    pub fn new(backend: Arc<B>) -> Self {
        Self { backend }
    }

    pub async fn record(&self, owner: &Identity, stream: &StreamId) -> TitanResult<()> {
        loop {
            let (mut rec, precondition) = self.load_with_precondition(owner).await?;
            if rec.streams.contains(stream) {
                return Ok(());
            }
            rec.streams.push(stream.clone());
            let bytes = TextCodec::encode(&rec)?;
            match self.backend.write(owner, SUBSCRIPTIONS_SLOT, bytes, CodecTag::Text, precondition).await {
                Ok(_) => return Ok(()),
                Err(e) if e.kind == ErrorKind::Conflict => continue,
                Err(e) => return Err(e),
            }
        }
    }

    pub async fn forget(&self, owner: &Identity, stream: &StreamId) -> TitanResult<()> {
        loop {
            let (mut rec, precondition) = self.load_with_precondition(owner).await?;
            let before = rec.streams.len();
            rec.streams.retain(|s| s != stream);
            if rec.streams.len() == before {
                return Ok(());
            }
            let bytes = TextCodec::encode(&rec)?;
            match self.backend.write(owner, SUBSCRIPTIONS_SLOT, bytes, CodecTag::Text, precondition).await {
                Ok(_) => return Ok(()),
                Err(e) if e.kind == ErrorKind::Conflict => continue,
                Err(e) => return Err(e),
            }
        }
    }

    pub async fn load(&self, owner: &Identity) -> TitanResult<Vec<StreamId>> {
        Ok(self.load_with_precondition(owner).await?.0.streams)
    }

    async fn load_with_precondition(&self, owner: &Identity) -> TitanResult<(SubscriptionRecord, Precondition)> {
        match self.backend.read(owner, SUBSCRIPTIONS_SLOT).await? {
            Some(rec) => Ok((TextCodec::decode(&rec.bytes)?, Precondition::Exactly(rec.etag))),
            None => Ok((SubscriptionRecord::default(), Precondition::MustNotExist)),
        }
    }
}
