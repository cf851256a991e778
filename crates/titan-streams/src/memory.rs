//! The in-memory stream provider:
//! fan-out to every live subscriber of a stream with at-least-once delivery
//! and per-stream FIFO. An event published while a stream has no
//! subscribers is dropped, as required for the non-durable provider.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use titan_primitives::TitanResult;
use tokio::task::JoinHandle;
use tracing::warn;

use crate::event::StreamEvent;
use crate::id::{StreamId, SubscriptionId};
use crate::queue::{BackpressurePolicy, StreamConfig, SubscriberQueue};
use crate::subscriber::Subscriber;

struct Subscription {
    queue: Arc<SubscriberQueue>,
    task: JoinHandle<()>,
}

struct StreamState {
    next_seq: AtomicU64,
    subscriptions: DashMap<SubscriptionId, Subscription>,
}

impl Default for StreamState {
    fn default() -> Self {
        Self { next_seq: AtomicU64::new(0), subscriptions: DashMap::new() }
    }
}

/// A handle returned by [`MemoryProvider::subscribe`]; dropping it does not
/// unsubscribe — call [`SubscriptionHandle::unsubscribe`] explicitly so a
/// handler's last in-flight delivery is allowed to finish cleanly.
pub struct SubscriptionHandle {
    stream: StreamId,
    id: SubscriptionId,
    provider: Arc<MemoryProvider>,
}

impl SubscriptionHandle {
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    pub fn unsubscribe(self) {
        self.provider.remove_subscription(&self.stream, self.id);
    }
}

#[derive(Default)]
pub struct MemoryProvider {
    streams: DashMap<StreamId, Arc<StreamState>>,
}

impl MemoryProvider {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Publishes `payload` to every current subscriber of `stream`. Returns
    /// the sequence number assigned, or `None` if the stream had no
    /// subscribers (the event is dropped rather than buffered).
    pub async fn publish(&self, stream: &StreamId, payload: Vec<u8>) -> TitanResult<Option<u64>> {
        let Some(state) = self.streams.get(stream).map(|s| Arc::clone(s.value())) else {
            return Ok(None);
        };
        if state.subscriptions.is_empty() {
            return Ok(None);
        }
        let seq = state.next_seq.fetch_add(1, Ordering::Relaxed);
        let event = StreamEvent { seq, payload };
        for entry in state.subscriptions.iter() {
            entry.value().queue.push(event.clone()).await;
        }
        Ok(Some(seq))
    }

    pub fn subscribe(
        self: &Arc<Self>,
        stream: StreamId,
        config: StreamConfig,
        subscriber: Arc<dyn Subscriber>,
    ) -> SubscriptionHandle {
        let state = self.streams.entry(stream.clone()).or_default().clone();
        let id = SubscriptionId::new();
        let queue = Arc::new(SubscriberQueue::new(config));
        let worker_queue = Arc::clone(&queue);
        let stream_for_log = stream.clone();
        let task = tokio::spawn(async move {
            while let Some(event) = worker_queue.pop().await {
                if let Err(e) = subscriber.deliver(event).await {
                    warn!(stream = %stream_for_log, error = %e, "subscriber delivery failed; continuing at-least-once");
                }
            }
        });
        state.subscriptions.insert(id, Subscription { queue, task });
        SubscriptionHandle { stream, id, provider: Arc::clone(self) }
    }

    fn remove_subscription(&self, stream: &StreamId, id: SubscriptionId) {
        if let Some(state) = self.streams.get(stream) {
            if let Some((_, sub)) = state.subscriptions.remove(&id) {
                sub.queue.close();
                sub.task.abort();
            }
        }
    }

    pub fn subscriber_count(&self, stream: &StreamId) -> usize {
        self.streams.get(stream).map(|s| s.subscriptions.len()).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::time::Duration;

    fn stream() -> StreamId {
        StreamId::new("trade", "season-1", "c1")
    }

    struct Collector(Mutex<Vec<Vec<u8>>>);

    #[async_trait::async_trait]
    impl Subscriber for Collector {
        async fn deliver(&self, event: StreamEvent) -> TitanResult<()> {
            self.0.lock().unwrap().push(event.payload);
            Ok(())
        }
    }

    #[tokio::test]
    async fn publish_with_no_subscribers_is_dropped() {
        let provider = MemoryProvider::new();
        let seq = provider.publish(&stream(), b"hello".to_vec()).await.unwrap();
        assert_eq!(seq, None);
    }

    #[tokio::test]
    async fn subscriber_receives_published_events_in_order() {
        let provider = MemoryProvider::new();
        let collector = Arc::new(Collector(Mutex::new(Vec::new())));
        let handle = provider.subscribe(stream(), StreamConfig::default(), collector.clone());

        provider.publish(&stream(), b"one".to_vec()).await.unwrap();
        provider.publish(&stream(), b"two".to_vec()).await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert_eq!(collector.0.lock().unwrap().as_slice(), &[b"one".to_vec(), b"two".to_vec()]);
        handle.unsubscribe();
    }

    #[tokio::test]
    async fn unsubscribe_stops_further_delivery() {
        let provider = MemoryProvider::new();
        let collector = Arc::new(Collector(Mutex::new(Vec::new())));
        let handle = provider.subscribe(stream(), StreamConfig::default(), collector.clone());
        assert_eq!(provider.subscriber_count(&stream()), 1);
        handle.unsubscribe();
        assert_eq!(provider.subscriber_count(&stream()), 0);

        let seq = provider.publish(&stream(), b"late".to_vec()).await.unwrap();
        assert_eq!(seq, None);
    }

    #[tokio::test]
    async fn drop_oldest_policy_keeps_most_recent_events_under_pressure() {
        let provider = MemoryProvider::new();
        let collector = Arc::new(Collector(Mutex::new(Vec::new())));
        let config = StreamConfig { max_pending: 1, backpressure: BackpressurePolicy::DropOldest };
        let handle = provider.subscribe(stream(), config, collector.clone());

        // Publish faster than the single-slot queue can drain; DropOldest
        // must never block the publisher.
        for i in 0..5u8 {
            provider.publish(&stream(), vec![i]).await.unwrap();
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
        let received = collector.0.lock().unwrap();
        assert!(received.contains(&vec![4]), "most recent event must survive drop-oldest pressure");
        handle.unsubscribe();
    }
}
