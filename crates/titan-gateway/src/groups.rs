//! Per-connection group membership and event push. A "group" is a stream a
//! connection has asked to receive events from (e.g. `trade:<tradeId>`).
//! Each connection keeps its own subscription per joined stream; the
//! refcounting the gateway promises happens one level down, inside
//! `MemoryProvider`, which already drops a stream's internal state once its
//! last subscriber unsubscribes.

use std::sync::Arc;

use dashmap::DashMap;
use titan_primitives::TitanResult;
use titan_streams::{MemoryProvider, StreamConfig, StreamEvent, StreamId, SubscriptionHandle};
use tokio::sync::mpsc::UnboundedSender;

/// One client's outbound event sender plus the streams it is currently
/// subscribed to, so a connection's close can release every membership at
/// once instead of leaking a subscription per forgotten unsubscribe.
pub struct ConnectionGroups {
    streams: Arc<MemoryProvider>,
    sink: UnboundedSender<StreamEvent>,
    held: DashMap<StreamId, SubscriptionHandle>,
}

impl ConnectionGroups {
    pub fn new(streams: Arc<MemoryProvider>, sink: UnboundedSender<StreamEvent>) -> Self {
        Self { streams, sink, held: DashMap::new() }
    }

    /// Joins `stream`; a no-op if this connection already holds it.
    pub fn join(&self, stream: StreamId) {
        if self.held.contains_key(&stream) {
            return;
        }
        let sink = self.sink.clone();
        let forward = move |event: StreamEvent| -> TitanResult<()> {
            let _ = sink.send(event);
            Ok(())
        };
        let handle = self.streams.subscribe(stream.clone(), StreamConfig::default(), Arc::new(forward));
        self.held.insert(stream, handle);
    }

    /// Leaves `stream`, dropping this connection's subscription to it.
    pub fn leave(&self, stream: &StreamId) {
        if let Some((_, handle)) = self.held.remove(stream) {
            handle.unsubscribe();
        }
    }

    /// Called when a connection closes: leaves every group it still holds.
    pub fn leave_all(&self) {
        let streams: Vec<StreamId> = self.held.iter().map(|e| e.key().clone()).collect();
        for stream in streams {
            self.leave(&stream);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn two_connections_in_the_same_group_each_receive_published_events() {
        let streams = MemoryProvider::new();
        let stream = StreamId::new("trade", "standard", "t1");

        let (tx_a, mut rx_a) = tokio::sync::mpsc::unbounded_channel();
        let a = ConnectionGroups::new(streams.clone(), tx_a);
        a.join(stream.clone());

        let (tx_b, mut rx_b) = tokio::sync::mpsc::unbounded_channel();
        let b = ConnectionGroups::new(streams.clone(), tx_b);
        b.join(stream.clone());

        assert_eq!(streams.subscriber_count(&stream), 2);

        streams.publish(&stream, b"hi".to_vec()).await.unwrap();
        assert_eq!(rx_a.recv().await.unwrap().payload, b"hi".to_vec());
        assert_eq!(rx_b.recv().await.unwrap().payload, b"hi".to_vec());

        b.leave(&stream);
        assert_eq!(streams.subscriber_count(&stream), 1);
        a.leave_all();
        assert_eq!(streams.subscriber_count(&stream), 0);
    }
}
