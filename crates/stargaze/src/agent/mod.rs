//! Agent HTTP server.
//!
//! Serves one `EventLog` to any number of hubs. The log is fed by a single
//! ingest task; handlers only read.

mod routes;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use axum::routing::get;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

pub use routes::AgentState;

pub fn router(state: Arc<AgentState>) -> Router {
    Router::new()
        .route("/api/health", get(routes::health))
        .route("/api/events", get(routes::events))
        .route("/api/info", get(routes::info))
        .with_state(state)
}

/// Serve until `cancel` fires.
pub async fn serve(
    listener: TcpListener,
    state: Arc<AgentState>,
    cancel: CancellationToken,
) -> std::io::Result<()> {
    let local_addr: SocketAddr = listener.local_addr()?;
    tracing::info!(addr = %local_addr, agent_id = %state.agent_id, "agent server started");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move {
            cancel.cancelled().await;
        })
        .await
}
