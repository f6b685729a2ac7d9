//! range-media-server: serves a media directory with HTTP range support.

use std::sync::Arc;

use clap::Parser;
use range_media::{FsStore, ServerConfig, init_tracing, router};
use tokio::net::TcpListener;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = ServerConfig::parse();
    init_tracing(&config.log_filter)?;

    let store = FsStore::new(&config.media_root).await?;
    let root = store.root().display().to_string();
    let app = router(Arc::new(store));

    let listener = TcpListener::bind(config.bind).await?;
    tracing::info!(addr = %listener.local_addr()?, root = %root, "serving media");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}
