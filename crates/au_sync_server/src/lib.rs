//! HTTP and WebSocket adapter for aurelian workspaces.
//!
//! A thin surface over [`au_core::store::DirectoryStore`]:
//!
//! - `GET /workspaces` - workspace metadata list
//! - `GET /workspaces/:id` - metadata for one workspace
//! - `GET /workspaces/:id/download` - the raw serialized document
//! - `GET /workspaces/:id/sync` - WebSocket upgrade into a server-side
//!   sync session
//!
//! Store errors map onto statuses: not found to 404, validation to 400,
//! lock conflicts to 409, everything else to 500.

/// Server configuration from the environment
pub mod config;

/// Store error to HTTP status mapping
pub mod error;

/// Request handlers and router construction
pub mod handlers;

use std::net::SocketAddr;
use std::sync::Arc;

use au_core::store::DirectoryStore;
use tokio::sync::watch;
use tower_http::trace::TraceLayer;

pub use config::Config;
pub use handlers::router;

/// Shared state for all handlers: the store plus the shutdown signal that
/// cancels in-flight sync sessions.
#[derive(Clone)]
pub struct AppState {
    /// The workspace store being served
    pub store: Arc<DirectoryStore>,
    /// Flips to `true` when the server begins shutting down
    pub shutdown: watch::Sender<bool>,
}

/// Serve the adapter until `shutdown_signal` resolves, then drain active
/// sync sessions.
pub async fn serve(
    store: Arc<DirectoryStore>,
    addr: SocketAddr,
    shutdown_signal: impl std::future::Future<Output = ()> + Send + 'static,
) -> std::io::Result<()> {
    let (shutdown_tx, _) = watch::channel(false);
    let state = AppState {
        store,
        shutdown: shutdown_tx.clone(),
    };

    let app = router(state).layer(TraceLayer::new_for_http());

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(addr = %listener.local_addr()?, "server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal.await;
            tracing::info!("shutdown signal received - draining sync sessions");
            let _ = shutdown_tx.send(true);
        })
        .await
}
