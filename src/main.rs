//! Gantry server entry point

use std::sync::Arc;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use gantry::auth::StaticAuthenticator;
use gantry::cluster::{ClusterPool, Reconciler};
use gantry::config::{AppConfig, Cli};
use gantry::registry::FileRegistry;
use gantry::server::{self, AppState};
use gantry::terminal::{SessionTable, ShellCache};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config = AppConfig::from_cli(&cli)
        .map_err(|e| anyhow::anyhow!("configuration error: {e}"))?;

    let registry = Arc::new(FileRegistry::new(&cli.registry_file));
    let authenticator = Arc::new(
        StaticAuthenticator::from_yaml_file(&cli.registry_file)
            .await
            .map_err(|e| anyhow::anyhow!("authenticator load failed: {e}"))?,
    );

    let pool = ClusterPool::new(registry.clone());
    let sessions = Arc::new(SessionTable::new());
    let shells = Arc::new(ShellCache::new());

    let shutdown = CancellationToken::new();

    // Populate the pool before serving traffic; failures are per-cluster
    // and logged, a cold pool is not fatal
    if let Err(e) = pool.reconcile_once().await {
        tracing::warn!(error = %e, "initial reconcile pass failed");
    }

    tokio::spawn(
        Reconciler::new(pool.clone(), config.reconcile_period).run(shutdown.clone()),
    );
    sessions.clone().spawn_sweeper(shutdown.clone());
    shells.clone().spawn_sweeper(shutdown.clone());

    let state = AppState {
        config,
        pool,
        registry: registry.clone(),
        rules: registry,
        sessions,
        shells,
        authenticator,
    };

    let server_shutdown = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("shutdown signal received");
            server_shutdown.cancel();
        }
    });

    server::serve(cli.listen_addr, state, shutdown)
        .await
        .map_err(|e| anyhow::anyhow!("server failed: {e}"))?;

    Ok(())
}
