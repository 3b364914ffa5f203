use std::sync::Arc;

use tracing::info;
use tracing_subscriber::EnvFilter;

use methods::{Config, InMemoryBroker, InMemoryMethodRepository, Result, Service};

#[tokio::main]
async fn main() -> Result {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("methods=info")),
        )
        .init();

    let config = Config::from_env()?;
    let addr = config.http_addr;

    let mut service = Service::new(
        config,
        Arc::new(InMemoryBroker::new()),
        Arc::new(InMemoryMethodRepository::new()),
    );
    service.start()?;

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "Methods service listening");

    axum::serve(listener, service.router())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    let stats = service.stop().await?;
    info!(handled = stats.handled, "Shut down cleanly");
    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("Received shutdown signal");
}
