//! HTTP/WebSocket server wiring
//!
//! One axum router fronts everything: login, the cluster listing, the
//! resource facade surface, terminal provisioning, and the exec WebSocket.

mod auth_routes;
mod clusters;
mod proxy;
mod terminal_routes;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::routing::get;
use axum::Router;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::auth::Authenticator;
use crate::cluster::ClusterPool;
use crate::config::AppConfig;
use crate::error::Error;
use crate::registry::{ClusterRegistry, CommandRuleStore};
use crate::terminal::{SessionTable, ShellCache};
use crate::Result;

/// Shared state for all handlers
#[derive(Clone)]
pub struct AppState {
    /// Process-wide configuration and key material
    pub config: Arc<AppConfig>,
    /// The cluster manager pool
    pub pool: Arc<ClusterPool>,
    /// Cluster registry, for the read-only cluster listing
    pub registry: Arc<dyn ClusterRegistry>,
    /// Terminal command rules
    pub rules: Arc<dyn CommandRuleStore>,
    /// Session-id to user bridge between provisioning and bind
    pub sessions: Arc<SessionTable>,
    /// Shell detection cache
    pub shells: Arc<ShellCache>,
    /// Login credential backend
    pub authenticator: Arc<dyn Authenticator>,
}

/// Build the application router
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(|| async { "ok" }))
        // Authentication
        .route("/login/{name}", axum::routing::post(auth_routes::login))
        .route("/currentuser", get(auth_routes::current_user))
        // Cluster registry view
        .route("/clusters", get(clusters::list))
        .route("/clusters/{name}", get(clusters::get))
        // Terminal provisioning and binding
        .route(
            "/kubernetes/apps/{appid}/pods/{pod}/terminal/namespaces/{namespace}/clusters/{cluster}",
            axum::routing::post(terminal_routes::provision),
        )
        .route("/ws/pods/exec", get(terminal_routes::exec_socket))
        // Resource facade surface
        .merge(proxy::router())
        .with_state(state)
}

/// Serve the router until the shutdown token fires
pub async fn serve(
    addr: SocketAddr,
    state: AppState,
    shutdown: CancellationToken,
) -> Result<()> {
    let router = build_router(state);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| Error::internal(format!("bind {addr}: {e}")))?;

    info!(addr = %addr, "server listening");
    axum::serve(listener, router)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
        .map_err(|e| Error::internal(format!("server error: {e}")))
}
