//! Exercises the runtime's headline invariant end to end: for any one cell
//! identity, concurrent invocations never interleave their execution.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use titan_directory::{Directory, DirectoryConfig, NodeId};
use titan_primitives::{CellKind, Identity, Key, TitanResult};
use titan_runtime::{Cell, CallChain, CallContext, CellRuntime};

struct Ledger {
    total: u64,
}

#[derive(serde::Serialize, serde::Deserialize)]
enum LedgerCall {
    Deposit(u64),
    Balance,
}

#[async_trait]
impl Cell for Ledger {
    type Call = LedgerCall;
    type Reply = u64;

    fn kind() -> &'static str {
        "Ledger"
    }

    fn new(_identity: Identity) -> Self {
        Self { total: 0 }
    }

    async fn on_activate(&mut self, _ctx: &CallContext<Self>) -> TitanResult<()> {
        Ok(())
    }

    async fn handle(&mut self, call: Self::Call, _ctx: &CallContext<Self>) -> TitanResult<Self::Reply> {
        match call {
            LedgerCall::Deposit(amount) => {
                // A read-modify-write with a yield in between: any interleaved
                // execution against the same identity would lose an update.
                let before = self.total;
                tokio::time::sleep(Duration::from_millis(1)).await;
                self.total = before + amount;
                Ok(self.total)
            }
            LedgerCall::Balance => Ok(self.total),
        }
    }
}

fn directory() -> (Arc<Directory>, NodeId) {
    let dir = tempfile::tempdir().unwrap();
    let db = sled::open(dir.path()).unwrap();
    std::mem::forget(dir);
    let directory = Directory::open(&db, DirectoryConfig::default()).unwrap();
    let node = NodeId::new();
    directory.heartbeat(&node, vec!["127.0.0.1:9300".into()]).unwrap();
    (Arc::new(directory), node)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn concurrent_deposits_against_one_identity_never_interleave() {
    let (directory, node) = directory();
    let runtime = Arc::new(CellRuntime::<Ledger>::new(node, directory));
    let id = Identity::new(CellKind::from("Ledger"), Key::string("acct-1"));

    let mut tasks = Vec::new();
    for _ in 0..20u64 {
        let runtime = Arc::clone(&runtime);
        let id = id.clone();
        tasks.push(tokio::spawn(async move {
            let chain: CallChain = Arc::new(vec![id.clone()]);
            runtime.invoke(&id, LedgerCall::Deposit(1), chain, None).await.unwrap()
        }));
    }
    for t in tasks {
        t.await.unwrap();
    }

    let chain: CallChain = Arc::new(vec![id.clone()]);
    let balance = runtime.invoke(&id, LedgerCall::Balance, chain, None).await.unwrap();
    assert_eq!(balance, 20);
    assert_eq!(runtime.active_count(), 1);
}
