//! Process-wide cell runtimes this silo hosts, wired the same way
//! `titan_gateway::cells` wires its own copy over the shared storage and
//! directory. Each runtime carries an `HttpTransport` so a call whose
//! identity the directory places on a different live node is forwarded
//! there over `/internal/cells/:kind` (see [`crate::internal`]).

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use titan_directory::{Directory, DirectoryConfig, NodeId};
use titan_domain::{Account, BaseTypeRegistry, Character, Inventory, Season, Trade};
use titan_ratelimit::RateLimiter;
use titan_runtime::{Cell, CellRuntime, ForwardableRuntime, HttpTransport, RemoteTransport};
use titan_streams::MemoryProvider;
use titan_txn::Coordinator;

/// The retry-wrapped backend every hosted cell and the rate limiter read and
/// write through; the same type `titan_domain::infra` wires up.
pub use titan_domain::infra::Backend;

pub struct Cells {
    pub backend: Arc<Backend>,
    pub directory: Arc<Directory>,
    pub streams: Arc<MemoryProvider>,
    pub rate_limiter: Arc<RateLimiter<Backend>>,
    pub node: NodeId,
    pub account: Arc<CellRuntime<Account>>,
    pub character: Arc<CellRuntime<Character>>,
    pub inventory: Arc<CellRuntime<Inventory>>,
    pub trade: Arc<CellRuntime<Trade>>,
    pub season: Arc<CellRuntime<Season>>,
    pub base_type: Arc<CellRuntime<BaseTypeRegistry>>,
    /// Every hosted cell kind's inbound forwarding entry point, keyed by
    /// `Cell::kind()`, for `crate::internal`'s receiving route.
    pub forward_routes: Arc<HashMap<&'static str, Arc<dyn ForwardableRuntime>>>,
}

static WIRING: RwLock<Option<Cells>> = RwLock::new(None);

#[cfg(test)]
pub(crate) static TEST_GUARD: Mutex<()> = Mutex::new(());

pub fn init(
    backend: Arc<Backend>,
    coordinator: Arc<Coordinator<Backend>>,
    streams: Arc<MemoryProvider>,
    rate_limiter: Arc<RateLimiter<Backend>>,
    directory: Arc<Directory>,
    node: NodeId,
) {
    titan_domain::infra::init(Arc::clone(&backend), coordinator, Arc::clone(&streams), Arc::clone(&directory), node.clone());

    let transport: Arc<dyn RemoteTransport> = Arc::new(HttpTransport::new(Arc::clone(&directory), directory.failure_timeout()));

    let account = Arc::new(CellRuntime::<Account>::new(node.clone(), Arc::clone(&directory)).with_transport(Arc::clone(&transport)));
    let character = Arc::new(CellRuntime::<Character>::new(node.clone(), Arc::clone(&directory)).with_transport(Arc::clone(&transport)));
    let inventory = Arc::new(CellRuntime::<Inventory>::new(node.clone(), Arc::clone(&directory)).with_transport(Arc::clone(&transport)));
    let trade = Arc::new(CellRuntime::<Trade>::new(node.clone(), Arc::clone(&directory)).with_transport(Arc::clone(&transport)));
    let season = Arc::new(CellRuntime::<Season>::new(node.clone(), Arc::clone(&directory)).with_transport(Arc::clone(&transport)));
    let base_type = Arc::new(CellRuntime::<BaseTypeRegistry>::new(node.clone(), Arc::clone(&directory)).with_transport(Arc::clone(&transport)));

    let mut forward_routes: HashMap<&'static str, Arc<dyn ForwardableRuntime>> = HashMap::new();
    forward_routes.insert(Account::kind(), Arc::clone(&account) as Arc<dyn ForwardableRuntime>);
    forward_routes.insert(Character::kind(), Arc::clone(&character) as Arc<dyn ForwardableRuntime>);
    forward_routes.insert(Inventory::kind(), Arc::clone(&inventory) as Arc<dyn ForwardableRuntime>);
    forward_routes.insert(Trade::kind(), Arc::clone(&trade) as Arc<dyn ForwardableRuntime>);
    forward_routes.insert(Season::kind(), Arc::clone(&season) as Arc<dyn ForwardableRuntime>);
    forward_routes.insert(BaseTypeRegistry::kind(), Arc::clone(&base_type) as Arc<dyn ForwardableRuntime>);

    let cells = Cells {
        backend,
        streams,
        rate_limiter,
        account,
        character,
        inventory,
        trade,
        season,
        base_type,
        forward_routes: Arc::new(forward_routes),
        node: node.clone(),
        directory,
    };
    *WIRING.write().unwrap() = Some(cells);
}

pub fn forward_routes() -> Arc<HashMap<&'static str, Arc<dyn ForwardableRuntime>>> {
    Arc::clone(&wiring().as_ref().expect("titan_silo::registry::init was not called before first request").forward_routes)
}

pub fn wiring() -> std::sync::RwLockReadGuard<'static, Option<Cells>> {
    WIRING.read().unwrap()
}

macro_rules! accessor {
    ($name:ident, $field:ident, $ty:ty) => {
        pub fn $name() -> Arc<CellRuntime<$ty>> {
            Arc::clone(&wiring().as_ref().expect("titan_silo::registry::init was not called before first request").$field)
        }
    };
}

accessor!(account, account, Account);
accessor!(character, character, Character);
accessor!(inventory, inventory, Inventory);
accessor!(trade, trade, Trade);
accessor!(season, season, Season);
accessor!(base_type, base_type, BaseTypeRegistry);

pub fn rate_limiter() -> Arc<RateLimiter<Backend>> {
    Arc::clone(&wiring().as_ref().expect("titan_silo::registry::init was not called before first request").rate_limiter)
}

pub fn streams() -> Arc<MemoryProvider> {
    Arc::clone(&wiring().as_ref().expect("titan_silo::registry::init was not called before first request").streams)
}

pub fn backend() -> Arc<Backend> {
    Arc::clone(&wiring().as_ref().expect("titan_silo::registry::init was not called before first request").backend)
}

pub fn directory() -> Arc<Directory> {
    Arc::clone(&wiring().as_ref().expect("titan_silo::registry::init was not called before first request").directory)
}

pub fn node() -> NodeId {
    wiring().as_ref().expect("titan_silo::registry::init was not called before first request").node.clone()
}

#[cfg(test)]
pub(crate) fn init_for_test() {
    let dir = tempfile::tempdir().unwrap();
    let db = sled::open(dir.path()).unwrap();
    std::mem::forget(dir);
    let backend = Arc::new(Backend::new(titan_storage::SledBackend::open(&db, "silo-test").unwrap(), titan_storage::RetryConfig::default()));
    let coordinator = Arc::new(Coordinator::new(Arc::clone(&backend)));
    let streams = MemoryProvider::new();
    let rate_limiter = Arc::new(RateLimiter::new(Arc::clone(&backend), Duration::from_secs(5)));

    let directory_dir = tempfile::tempdir().unwrap();
    let directory_db = sled::open(directory_dir.path()).unwrap();
    std::mem::forget(directory_dir);
    let directory = Arc::new(Directory::open(&directory_db, DirectoryConfig::default()).unwrap());
    let node = NodeId::new();
    directory.heartbeat(&node, vec!["127.0.0.1:9190".into()]).unwrap();

    init(backend, coordinator, streams, rate_limiter, directory, node);
}
