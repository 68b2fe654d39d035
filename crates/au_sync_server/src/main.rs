use std::sync::Arc;

use au_core::store::DirectoryStore;
use au_sync_server::Config;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "au_sync_server=info,au_core=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            error!("failed to load configuration: {e}");
            std::process::exit(1);
        }
    };

    info!("starting au sync server v{}", env!("CARGO_PKG_VERSION"));
    info!("storage directory: {}", config.directory.display());

    let store = match DirectoryStore::open(&config.directory) {
        Ok(s) => Arc::new(s),
        Err(e) => {
            error!("failed to open storage directory: {e}");
            std::process::exit(1);
        }
    };

    if let Err(e) = au_sync_server::serve(store, config.listen, shutdown_signal()).await {
        error!("server failed: {e}");
        std::process::exit(1);
    }

    info!("server shut down gracefully");
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
