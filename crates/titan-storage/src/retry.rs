//! A retry wrapper around any [`StorageBackend`]. Retries a configurable set of transient errors with
//! exponential backoff and jitter up to `max_retries`; all other kinds
//! propagate unchanged on the first failure. `Conflict` is never retried
//! here — it always means a logical concurrency violation, never the
//! physical retry class.

use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use titan_primitives::{CodecTag, Etag, ErrorKind, Identity, Precondition, SlotName, TitanError};
use tracing::warn;

use crate::backend::{StorageBackend, StoredRecord};

#[derive(Clone, Copy, Debug)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 5,
            initial_backoff: Duration::from_millis(20),
            max_backoff: Duration::from_secs(2),
        }
    }
}

pub struct RetryingBackend<B> {
    inner: B,
    config: RetryConfig,
}

impl<B: StorageBackend> RetryingBackend<B> {
    pub fn new(inner: B, config: RetryConfig) -> Self {
        Self { inner, config }
    }

    fn backoff_for(&self, attempt: u32) -> Duration {
        let base = self.config.initial_backoff.as_millis() as u64;
        let exp = base.saturating_mul(1u64 << attempt.min(16));
        let capped = exp.min(self.config.max_backoff.as_millis() as u64).max(1);
        let jitter = rand::thread_rng().gen_range(0..=capped);
        Duration::from_millis(jitter)
    }

    async fn with_retry<T, F, Fut>(&self, op_name: &str, mut op: F) -> Result<T, TitanError>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T, TitanError>>,
    {
        let mut attempt = 0;
        loop {
            match op().await {
                Ok(v) => return Ok(v),
                Err(e) if e.kind() == ErrorKind::Transient && attempt < self.config.max_retries => {
                    let delay = self.backoff_for(attempt);
                    warn!(op = op_name, attempt, ?delay, "retrying storage op after transient error");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[async_trait]
impl<B: StorageBackend> StorageBackend for RetryingBackend<B> {
    async fn read(&self, cell: &Identity, slot: SlotName) -> Result<Option<StoredRecord>, TitanError> {
        self.with_retry("read", || self.inner.read(cell, slot)).await
    }

    async fn write(
        &self,
        cell: &Identity,
        slot: SlotName,
        bytes: Vec<u8>,
        codec: CodecTag,
        expected: Precondition,
    ) -> Result<Etag, TitanError> {
        self.with_retry("write", || self.inner.write(cell, slot, bytes.clone(), codec, expected.clone()))
            .await
    }

    async fn clear(&self, cell: &Identity, slot: SlotName, expected: Precondition) -> Result<(), TitanError> {
        self.with_retry("clear", || self.inner.clear(cell, slot, expected.clone())).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    struct FlakyBackend {
        fail_times: AtomicU32,
    }

    #[async_trait]
    impl StorageBackend for FlakyBackend {
        async fn read(&self, _cell: &Identity, _slot: SlotName) -> Result<Option<StoredRecord>, TitanError> {
            if self.fail_times.fetch_sub(1, Ordering::SeqCst) > 0 {
                Err(TitanError::transient("flaky"))
            } else {
                Ok(None)
            }
        }

        async fn write(
            &self,
            _cell: &Identity,
            _slot: SlotName,
            _bytes: Vec<u8>,
            _codec: CodecTag,
            _expected: Precondition,
        ) -> Result<Etag, TitanError> {
            unimplemented!()
        }

        async fn clear(&self, _cell: &Identity, _slot: SlotName, _expected: Precondition) -> Result<(), TitanError> {
            unimplemented!()
        }
    }

    #[tokio::test]
    async fn retries_transient_up_to_limit_then_succeeds() {
        let inner = FlakyBackend { fail_times: AtomicU32::new(3) };
        let backend = RetryingBackend::new(inner, RetryConfig { max_retries: 5, ..Default::default() });
        let id = Identity::new(titan_primitives::CellKind::from("X"), titan_primitives::Key::string("k"));
        let result = backend.read(&id, "PrimaryStore").await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn exhausting_retries_returns_transient() {
        let inner = FlakyBackend { fail_times: AtomicU32::new(100) };
        let backend = RetryingBackend::new(inner, RetryConfig { max_retries: 2, ..Default::default() });
        let id = Identity::new(titan_primitives::CellKind::from("X"), titan_primitives::Key::string("k"));
        let err = backend.read(&id, "PrimaryStore").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Transient);
    }

    #[tokio::test]
    async fn conflict_is_never_retried() {
        struct AlwaysConflict;
        #[async_trait]
        impl StorageBackend for AlwaysConflict {
            async fn read(&self, _cell: &Identity, _slot: SlotName) -> Result<Option<StoredRecord>, TitanError> {
                Err(TitanError::conflict("nope"))
            }
            async fn write(
                &self,
                _cell: &Identity,
                _slot: SlotName,
                _bytes: Vec<u8>,
                _codec: CodecTag,
                _expected: Precondition,
            ) -> Result<Etag, TitanError> {
                unimplemented!()
            }
            async fn clear(&self, _cell: &Identity, _slot: SlotName, _expected: Precondition) -> Result<(), TitanError> {
                unimplemented!()
            }
        }
        let backend = Arc::new(RetryingBackend::new(AlwaysConflict, RetryConfig::default()));
        let id = Identity::new(titan_primitives::CellKind::from("X"), titan_primitives::Key::string("k"));
        let err = backend.read(&id, "PrimaryStore").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);
    }
}
