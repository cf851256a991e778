//! The silo binary: a worker node that wires storage, the transaction
//! coordinator, directory membership, streams, the rate limiter and the
//! domain cells, then serves a health/admin surface until interrupted.
//! Exit codes: `0` orderly, `1` fatal misconfiguration, `2` membership-store
//! unreachable, `3` storage unreachable.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use titan_directory::{Directory, DirectoryConfig, NodeId};
use titan_ratelimit::RateLimiter;
use titan_silo::config::SiloConfig;
use titan_silo::{health, registry};
use titan_storage::SledBackend;
use titan_streams::MemoryProvider;
use titan_txn::Coordinator;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "titan-silo", about = "Worker node: hosts the domain cells over shared storage and directory")]
struct Cli {
    /// Path to a TOML configuration file overlaying the built-in defaults.
    #[arg(long)]
    config: Option<PathBuf>,
    /// Overrides `admin_listen_addr` from the config file.
    #[arg(long)]
    admin_listen_addr: Option<SocketAddr>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    tracing_subscriber::fmt().with_env_filter(tracing_subscriber::EnvFilter::from_default_env()).init();

    let mut config = match SiloConfig::load(cli.config.as_deref()) {
        Ok(c) => c,
        Err(e) => {
            error!(error = %e, "fatal misconfiguration");
            return ExitCode::from(1);
        }
    };
    if let Some(addr) = cli.admin_listen_addr {
        config.admin_listen_addr = addr;
    }

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(rt) => rt,
        Err(e) => {
            error!(error = %e, "failed to build the async runtime");
            return ExitCode::from(1);
        }
    };
    runtime.block_on(async_main(config))
}

async fn async_main(config: SiloConfig) -> ExitCode {
    info!(admin_listen_addr = %config.admin_listen_addr, "starting titan-silo");

    let storage_db = match sled::open(&config.storage.connection) {
        Ok(db) => db,
        Err(e) => {
            error!(error = %e, path = %config.storage.connection.display(), "storage unreachable at startup");
            return ExitCode::from(3);
        }
    };
    let backend = match SledBackend::open(&storage_db, "silo") {
        Ok(b) => Arc::new(registry::Backend::new(b, config.storage.retry.clone().into())),
        Err(e) => {
            error!(error = %e, "storage backend initialization failed");
            return ExitCode::from(3);
        }
    };

    let directory_db = match sled::open(&config.cluster.membership_store) {
        Ok(db) => db,
        Err(e) => {
            error!(error = %e, path = %config.cluster.membership_store.display(), "membership store unreachable at startup");
            return ExitCode::from(2);
        }
    };
    let directory_config = DirectoryConfig { failure_timeout: config.directory_failure_timeout(), ..DirectoryConfig::default() };
    let directory = match Directory::open(&directory_db, directory_config) {
        Ok(d) => Arc::new(d),
        Err(e) => {
            error!(error = %e, "membership store initialization failed");
            return ExitCode::from(2);
        }
    };
    let node = NodeId::new();
    let admin_endpoint = config.admin_listen_addr.to_string();
    if let Err(e) = directory.heartbeat(&node, vec![admin_endpoint.clone()]) {
        error!(error = %e, "failed to publish initial heartbeat");
        return ExitCode::from(2);
    }

    let coordinator = Arc::new(Coordinator::new(Arc::clone(&backend)).with_lock_timeout(config.lock_timeout()));
    let streams = MemoryProvider::new();
    let rate_limiter = Arc::new(RateLimiter::new(Arc::clone(&backend), Duration::from_secs(60)));

    registry::init(Arc::clone(&backend), coordinator, Arc::clone(&streams), rate_limiter, Arc::clone(&directory), node.clone());

    let heartbeat_interval = config.heartbeat_interval();
    let heartbeat_directory = Arc::clone(&directory);
    let heartbeat_node = node.clone();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(heartbeat_interval);
        loop {
            ticker.tick().await;
            if let Err(e) = heartbeat_directory.heartbeat(&heartbeat_node, vec![admin_endpoint.clone()]) {
                error!(error = %e, "failed to renew heartbeat");
            }
        }
    });

    let health_state = health::HealthState { directory: Arc::clone(&directory), failure_timeout: config.directory_failure_timeout() };
    let internal_state = titan_silo::internal::InternalState { routes: registry::forward_routes() };
    let app = health::router(health_state).merge(titan_silo::internal::router(internal_state));
    let listener = match tokio::net::TcpListener::bind(config.admin_listen_addr).await {
        Ok(l) => l,
        Err(e) => {
            error!(error = %e, "failed to bind admin listen address");
            return ExitCode::from(1);
        }
    };

    let shutdown = async {
        let _ = tokio::signal::ctrl_c().await;
        info!("received ctrl-c, shutting down");
    };

    match axum::serve(listener, app).with_graceful_shutdown(shutdown).await {
        Ok(()) => ExitCode::from(0),
        Err(e) => {
            error!(error = %e, "server exited with an error");
            ExitCode::from(1)
        }
    }
}
