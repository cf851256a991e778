//! Process-wide handles to the storage backend, transaction coordinator,
//! stream provider, and the `Season`/`Account` caller stubs that every
//! domain cell needs but that `Cell::new` has no way to receive (it takes
//! only an `Identity`). A host binary (the silo) calls [`init`] once at
//! startup before routing any traffic; every domain cell reaches back into
//! these statics rather than carrying its own copy.
//!
//! Tests that call [`init_for_test`] replace the wiring for the whole
//! process, so domain-cell tests that touch storage must not run
//! concurrently with each other; each test takes `TEST_GUARD` for its
//! duration to enforce that.

use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use titan_directory::{Directory, DirectoryConfig, NodeId};
use titan_runtime::{CallerStub, CellRuntime};
use titan_storage::{RetryingBackend, SledBackend};
use titan_streams::MemoryProvider;
use titan_txn::Coordinator;

use crate::account::Account;
use crate::season::Season;

/// The durable backend every domain cell reads and writes through:
/// `sled` wrapped in [`RetryingBackend`] so a transient storage fault is
/// absorbed here once rather than by every cell's own storage call site.
pub type Backend = RetryingBackend<SledBackend>;

struct Wiring {
    backend: Arc<Backend>,
    coordinator: Arc<Coordinator<Backend>>,
    streams: Arc<MemoryProvider>,
    season_caller: CallerStub<Season>,
    account_caller: CallerStub<Account>,
}

static WIRING: RwLock<Option<Wiring>> = RwLock::new(None);

#[cfg(test)]
pub(crate) static TEST_GUARD: Mutex<()> = Mutex::new(());

pub fn init(backend: Arc<Backend>, coordinator: Arc<Coordinator<Backend>>, streams: Arc<MemoryProvider>, directory: Arc<Directory>, node: NodeId) {
    let season_runtime = Arc::new(CellRuntime::<Season>::new(node.clone(), Arc::clone(&directory)));
    let season_caller = CallerStub::new(season_runtime, Duration::from_secs(5));
    let account_runtime = Arc::new(CellRuntime::<Account>::new(node, directory));
    let account_caller = CallerStub::new(account_runtime, Duration::from_secs(5));
    *WIRING.write().unwrap() = Some(Wiring { backend, coordinator, streams, season_caller, account_caller });
}

fn wiring() -> std::sync::RwLockReadGuard<'static, Option<Wiring>> {
    WIRING.read().unwrap()
}

pub fn backend() -> Arc<Backend> {
    Arc::clone(&wiring().as_ref().expect("titan_domain::infra::init was not called before first cell activation").backend)
}

pub fn coordinator() -> Arc<Coordinator<Backend>> {
    Arc::clone(&wiring().as_ref().expect("titan_domain::infra::init was not called before first cell activation").coordinator)
}

pub fn streams() -> Arc<MemoryProvider> {
    Arc::clone(&wiring().as_ref().expect("titan_domain::infra::init was not called before first cell activation").streams)
}

pub fn season_caller() -> CallerStub<Season> {
    wiring().as_ref().expect("titan_domain::infra::init was not called before first cell activation").season_caller.clone()
}

pub fn account_caller() -> CallerStub<Account> {
    wiring().as_ref().expect("titan_domain::infra::init was not called before first cell activation").account_caller.clone()
}

#[cfg(test)]
pub(crate) fn init_for_test() -> (Arc<Backend>, Arc<Coordinator<Backend>>, Arc<MemoryProvider>) {
    let dir = tempfile::tempdir().unwrap();
    let db = sled::open(dir.path()).unwrap();
    std::mem::forget(dir);
    let backend = Arc::new(RetryingBackend::new(SledBackend::open(&db, "domain-test").unwrap(), titan_storage::RetryConfig::default()));
    let coordinator = Arc::new(Coordinator::new(Arc::clone(&backend)));
    let streams = MemoryProvider::new();

    let directory_dir = tempfile::tempdir().unwrap();
    let directory_db = sled::open(directory_dir.path()).unwrap();
    std::mem::forget(directory_dir);
    let directory = Arc::new(Directory::open(&directory_db, DirectoryConfig::default()).unwrap());
    let node = NodeId::new();
    directory.heartbeat(&node, vec!["127.0.0.1:9000".into()]).unwrap();

    init(Arc::clone(&backend), Arc::clone(&coordinator), Arc::clone(&streams), directory, node);
    (backend, coordinator, streams)
}
