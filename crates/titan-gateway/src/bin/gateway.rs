//! The gateway binary: loads the hierarchical configuration, opens the
//! storage and membership-store sled databases, wires the process-wide
//! cell runtimes, and serves the HTTP/stream surface until interrupted.
//! Exit codes: `0` orderly, `1` fatal misconfiguration, `2` membership-store
//! unreachable, `3` storage unreachable.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use titan_directory::{Directory, DirectoryConfig, NodeId};
use titan_gateway::auth::{AuthProvider, MockProvider, SessionStore};
use titan_gateway::{cells, AppState, GatewayConfig};
use titan_ratelimit::RateLimiter;
use titan_storage::SledBackend;
use titan_streams::MemoryProvider;
use titan_txn::Coordinator;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "titan-gateway", about = "Session gateway: auth, ticketed stream connections, typed hub dispatch")]
struct Cli {
    /// Path to a TOML configuration file overlaying the built-in defaults.
    #[arg(long)]
    config: Option<PathBuf>,
    /// Overrides `listen_addr` from the config file.
    #[arg(long)]
    listen_addr: Option<SocketAddr>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    tracing_subscriber::fmt().with_env_filter(tracing_subscriber::EnvFilter::from_default_env()).init();

    let mut config = match GatewayConfig::load(cli.config.as_deref()) {
        Ok(c) => c,
        Err(e) => {
            error!(error = %e, "fatal misconfiguration");
            return ExitCode::from(1);
        }
    };
    if let Some(addr) = cli.listen_addr {
        config.listen_addr = addr;
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

async fn async_main(config: GatewayConfig) -> ExitCode {
    info!(listen_addr = %config.listen_addr, "starting titan-gateway");

    let storage_db = match sled::open(&config.storage.connection) {
        Ok(db) => db,
        Err(e) => {
            error!(error = %e, path = %config.storage.connection.display(), "storage unreachable at startup");
            return ExitCode::from(3);
        }
    };
    let backend = match SledBackend::open(&storage_db, "gateway") {
        Ok(b) => Arc::new(cells::Backend::new(b, config.storage.retry.clone().into())),
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
    let directory = match Directory::open(&directory_db, DirectoryConfig::default()) {
        Ok(d) => Arc::new(d),
        Err(e) => {
            error!(error = %e, "membership store initialization failed");
            return ExitCode::from(2);
        }
    };
    let node = NodeId::new();
    if let Err(e) = directory.heartbeat(&node, vec![config.listen_addr.to_string()]) {
        error!(error = %e, "failed to publish initial heartbeat");
        return ExitCode::from(2);
    }

    let coordinator = Arc::new(Coordinator::new(Arc::clone(&backend)));
    let streams = MemoryProvider::new();
    let rate_limiter = Arc::new(RateLimiter::new(Arc::clone(&backend), Duration::from_secs(60)));

    cells::init(Arc::clone(&backend), Arc::clone(&coordinator), Arc::clone(&streams), Arc::clone(&rate_limiter), Arc::clone(&directory), node.clone());

    let mut providers: HashMap<&'static str, Arc<dyn AuthProvider>> = HashMap::new();
    for name in &config.auth.providers {
        match name.as_str() {
            "Mock" => {
                providers.insert("Mock", Arc::new(MockProvider));
            }
            other => {
                error!(provider = other, "unknown auth provider named in configuration");
                return ExitCode::from(1);
            }
        }
    }

    let state = AppState {
        backend: Arc::clone(&backend),
        rate_limiter,
        sessions: Arc::new(SessionStore::new(config.session_settings())),
        providers: Arc::new(providers),
        ticket_ttl: config.ticket_ttl(),
    };

    let internal_state = titan_gateway::internal::InternalState { routes: cells::forward_routes() };
    let app = titan_gateway::http::router(state).merge(titan_gateway::internal::router(internal_state));
    let listener = match tokio::net::TcpListener::bind(config.listen_addr).await {
        Ok(l) => l,
        Err(e) => {
            error!(error = %e, "failed to bind listen address");
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
