//! The call path used by one cell's `handle` to invoke another identity.
//! Detects reentrancy against the
//! in-flight call chain before ever touching the target runtime, since a
//! reentrant call into a non-interleavable identity must fail fast rather
//! than deadlock waiting on a mailbox that will never drain.

use std::time::Instant;

use titan_primitives::{ErrorKind, Identity, TitanError, TitanResult};

use crate::cell::Cell;
use crate::context::CallContext;
use crate::runtime::CellRuntime;

/// A handle a cell implementation stores to call another cell kind. Cheap to
/// clone; wraps the target's [`CellRuntime`] plus the deadline policy shared
/// by every call made through it.
pub struct CallerStub<T: Cell> {
    runtime: std::sync::Arc<CellRuntime<T>>,
    default_timeout: std::time::Duration,
}

impl<T: Cell> Clone for CallerStub<T> {
    fn clone(&self) -> Self {
        Self { runtime: std::sync::Arc::clone(&self.runtime), default_timeout: self.default_timeout }
    }
}

impl<T: Cell> CallerStub<T> {
    pub fn new(runtime: std::sync::Arc<CellRuntime<T>>, default_timeout: std::time::Duration) -> Self {
        Self { runtime, default_timeout }
    }

    /// Invokes `target` with `call` on behalf of whatever cell is running
    /// under `ctx`. Rejects the call before it ever reaches a mailbox if
    /// `target` already appears in the current call chain and the operation
    /// is not marked interleavable.
    pub async fn call<C: Cell>(&self, ctx: &CallContext<C>, target: &Identity, call: T::Call) -> TitanResult<T::Reply>
    where
        T::Call: CallKindCheck,
    {
        if ctx.is_reentrant(target) && !call.is_interleavable() {
            return Err(TitanError::new(
                ErrorKind::Fatal,
                format!("reentrant call into {target} blocked: operation is not interleavable"),
            ));
        }
        let deadline = ctx.deadline.unwrap_or_else(|| Instant::now() + self.default_timeout);
        let chain = ctx.child_chain(target);
        self.runtime.invoke(target, call, chain, Some(deadline)).await
    }
}

/// Lets [`CallerStub::call`] consult `Cell::is_interleavable` for the target
/// kind without needing `T` itself in scope as a type parameter bound on
/// `Cell` (which would require naming `T::Call` twice in the same position).
pub trait CallKindCheck {
    fn is_interleavable(&self) -> bool;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cell::TransactionalIntent;
    use async_trait::async_trait;
    use std::sync::Arc;
    use titan_directory::{Directory, DirectoryConfig, NodeId};
    use titan_primitives::{CellKind, Key};

    #[derive(serde::Serialize, serde::Deserialize)]
    enum EchoCall {
        Ping,
        PingSelf,
    }

    impl CallKindCheck for EchoCall {
        fn is_interleavable(&self) -> bool {
            matches!(self, EchoCall::PingSelf)
        }
    }

    struct Echo;

    #[async_trait]
    impl Cell for Echo {
        type Call = EchoCall;
        type Reply = String;

        fn kind() -> &'static str {
            "Echo"
        }

        fn new(_identity: Identity) -> Self {
            Self
        }

        async fn on_activate(&mut self, _ctx: &CallContext<Self>) -> TitanResult<()> {
            Ok(())
        }

        async fn handle(&mut self, call: Self::Call, _ctx: &CallContext<Self>) -> TitanResult<Self::Reply> {
            match call {
                EchoCall::Ping => Ok("pong".to_string()),
                EchoCall::PingSelf => Ok("self-pong".to_string()),
            }
        }

        fn is_interleavable(call: &Self::Call) -> bool {
            matches!(call, EchoCall::PingSelf)
        }

        fn transactional_intent(_call: &Self::Call) -> TransactionalIntent {
            TransactionalIntent::NotTransactional
        }
    }

    fn directory() -> (Arc<Directory>, NodeId) {
        let dir = tempfile::tempdir().unwrap();
        let db = sled::open(dir.path()).unwrap();
        std::mem::forget(dir);
        let directory = Directory::open(&db, DirectoryConfig::default()).unwrap();
        let node = NodeId::new();
        directory.heartbeat(&node, vec!["127.0.0.1:9000".into()]).unwrap();
        (Arc::new(directory), node)
    }

    #[tokio::test]
    async fn reentrant_non_interleavable_call_is_rejected_before_dispatch() {
        let (directory, node) = directory();
        let runtime = Arc::new(CellRuntime::<Echo>::new(node, directory));
        let stub = CallerStub::new(Arc::clone(&runtime), std::time::Duration::from_secs(5));
        let id = Identity::new(CellKind::from("Echo"), Key::string("e1"));
        let ctx = CallContext::<Echo>::root(id.clone(), None);
        // Simulate being already inside a call to `id` by widening the chain.
        let nested_ctx = CallContext::<Echo>::with_chain(id.clone(), ctx.child_chain(&id), None);
        let err = stub.call(&nested_ctx, &id, EchoCall::Ping).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::Fatal);
    }

    #[tokio::test]
    async fn reentrant_interleavable_call_is_forwarded() {
        let (directory, node) = directory();
        let runtime = Arc::new(CellRuntime::<Echo>::new(node, directory));
        let stub = CallerStub::new(Arc::clone(&runtime), std::time::Duration::from_secs(5));
        let id = Identity::new(CellKind::from("Echo"), Key::string("e2"));
        let ctx = CallContext::<Echo>::root(id.clone(), None);
        let nested_ctx = CallContext::<Echo>::with_chain(id.clone(), ctx.child_chain(&id), None);
        let reply = stub.call(&nested_ctx, &id, EchoCall::PingSelf).await.unwrap();
        assert_eq!(reply, "self-pong".to_string());
    }
}
