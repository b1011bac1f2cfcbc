//! dockgate: host-based reverse proxy for Docker workloads.

use std::sync::Arc;

use anyhow::Context;
use log::{error, info};
use tokio::net::TcpListener;
use tokio::signal;
use tokio_util::sync::CancellationToken;

mod config;
mod error;
mod index_page;
mod proxy_server;
mod refresh;
mod resolver;
mod runtime;
mod table;
mod types;

use config::Config;
use proxy_server::{serve, Dispatcher};
use refresh::Refresher;
use resolver::TargetResolver;
use runtime::DockerLister;
use table::RoutingTable;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    // Load configuration
    let cfg = Config::load()?;
    info!("Starting dockgate with config: {:?}", cfg);

    // Shared state
    let table = Arc::new(RoutingTable::new());
    let cancel = CancellationToken::new();

    let listener = TcpListener::bind(cfg.listen)
        .await
        .with_context(|| format!("failed to bind {}", cfg.listen))?;
    info!("Listening on {}", cfg.listen);

    // Refresh loop
    let refresher = Refresher::new(
        DockerLister::new(),
        Arc::clone(&table),
        TargetResolver::new(cfg.network.clone()),
        cfg.refresh_interval(),
    );
    let refresh_handle = tokio::spawn(refresher.run(cancel.clone()));

    // Proxy
    let dispatcher = Arc::new(Dispatcher::new(Arc::clone(&table), cfg.fallback()));
    let proxy_handle = tokio::spawn(serve(listener, dispatcher, cancel.clone()));

    // Graceful Shutdown
    match signal::ctrl_c().await {
        Ok(()) => {
            info!("Received Ctrl+C, shutting down...");
        }
        Err(err) => {
            error!("Unable to listen for shutdown signal: {}", err);
        }
    }

    cancel.cancel();
    if let Err(e) = proxy_handle.await {
        error!("Proxy task failed: {}", e);
    }
    // A refresh cycle blocked on the Docker daemon would never observe
    // the cancellation.
    refresh_handle.abort();

    info!("Shutdown complete.");
    Ok(())
}
