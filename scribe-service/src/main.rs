use std::sync::Arc;

use metrics_exporter_prometheus::PrometheusBuilder;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

mod api;
mod config;
mod error;
mod events;
mod ocr;
mod records;
mod render;
mod service;
mod storage;
#[cfg(test)]
mod testing;

use crate::config::{ScribeConfig, ServiceRole};
use crate::service::ScribeService;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_logging();

    info!("Starting Scribe service v{}", env!("CARGO_PKG_VERSION"));

    let config = Arc::new(ScribeConfig::load()?);
    info!(
        role = config.role.as_str(),
        host = %config.server.host,
        port = config.server.port,
        bucket = %config.storage.bucket,
        "Configuration loaded"
    );

    std::fs::create_dir_all(&config.storage.data_dir)?;

    let metrics = match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => Some(handle),
        Err(e) => {
            warn!(error = %e, "Prometheus recorder unavailable, /metrics will be empty");
            None
        }
    };

    // Any process running the worker owns its queue; the event endpoint feeds
    // it, and in role `all` the local object store publishes to it as well
    let (event_tx, event_rx) = if config.role.runs_worker() {
        let (tx, rx) = mpsc::channel(config.worker.event_queue_capacity);
        (Some(tx), Some(rx))
    } else {
        (None, None)
    };
    let local_tx = event_tx.clone().filter(|_| config.role == ServiceRole::All);

    let service = Arc::new(ScribeService::from_config(config.clone(), local_tx)?);

    let shutdown = CancellationToken::new();
    let worker = event_rx.map(|rx| {
        ScribeService::start_event_worker(service.clone(), rx, shutdown.clone())
    });

    let app = api::router(service.clone(), metrics, event_tx);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = TcpListener::bind(&addr).await?;
    info!("Listening on {}", addr);

    let server_shutdown = shutdown.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "Failed to listen for shutdown signal");
                std::future::pending::<()>().await;
            }
            info!("Shutdown signal received");
            server_shutdown.cancel();
        })
        .await?;

    shutdown.cancel();
    if let Some(worker) = worker {
        worker.await?;
    }

    info!("Scribe service stopped");
    Ok(())
}

fn init_logging() {
    use tracing_subscriber::{EnvFilter, fmt, prelude::*};

    let format = fmt::format()
        .with_target(true)
        .with_thread_ids(true)
        .compact();

    // Use RUST_LOG if set, otherwise default to info level for our crate
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("scribe_service=info"));

    tracing_subscriber::registry()
        .with(fmt::layer().event_format(format))
        .with(filter)
        .init();
}
