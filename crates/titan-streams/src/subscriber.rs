//! The handler contract a stream delivers to.
//! Left abstract rather than tied to [`titan_runtime::Cell`] so this crate
//! carries no dependency on the runtime: a caller that wants mailbox-
//! serialized delivery implements [`Subscriber`] over a
//! `titan_runtime::CallerStub`, while a caller that wants direct in-process
//! delivery implements it over a plain closure.

use async_trait::async_trait;
use titan_primitives::TitanResult;

use crate::event::StreamEvent;

#[async_trait]
pub trait Subscriber: Send + Sync {
    async fn deliver(&self, event: StreamEvent) -> TitanResult<()>;
}

#[async_trait]
impl<F> Subscriber for F
where
    F: Fn(StreamEvent) -> TitanResult<()> + Send + Sync,
{
    async fn deliver(&self, event: StreamEvent) -> TitanResult<()> {
        (self)(event)
    }
}
