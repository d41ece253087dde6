//! redis-porter - Live key-value migration
//!
//! This is the composition root that wires together all the components.

use redis_porter::{
    load_config, shutdown_signal, MigrationService, RdbDecoder, ShutdownController, TcpConnector,
};
use std::sync::Arc;
use tracing_subscriber::fmt::format::FmtSpan;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration from environment
    let cfg = load_config()?;
    cfg.validate()?;

    // Setup logging
    let log_level = if cfg.debug {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_span_events(FmtSpan::CLOSE)
        .init();

    tracing::info!(
        "starting redis-porter from={} to={} backoff={}s",
        cfg.from,
        cfg.to,
        cfg.retry_backoff_secs
    );

    // ===== COMPOSITION ROOT =====

    // 1. Outbound adapters
    let connector = Arc::new(TcpConnector::new(cfg.connect_timeout()));
    let decoder = Arc::new(RdbDecoder::new());

    // 2. Shutdown on Ctrl+C / SIGTERM
    let shutdown = ShutdownController::new();
    tokio::spawn(shutdown_signal(shutdown.clone()));

    // 3. Session supervisor
    let service = MigrationService::new(cfg, connector, decoder, shutdown);
    service.run().await;

    Ok(())
}
