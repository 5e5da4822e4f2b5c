use anyhow::Result;
use energy_monitor::{config::AppConfig, ingest::IngestService, metrics_server, observability};
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> Result<()> {
    observability::init_tracing("energy_monitor=info");

    let cfg = AppConfig::load()?;

    if let Some(metrics_cfg) = &cfg.metrics {
        metrics_server::init(&metrics_cfg.bind_addr)?;
    }

    let pool = energy_client::connect(&cfg.storage.path, cfg.storage.max_connections).await?;
    tracing::info!(path = %cfg.storage.path.display(), "opened measurement database");

    let shutdown = CancellationToken::new();
    let handle = IngestService::new(pool, cfg.mqtt.clone(), cfg.ingest.cost_per_kwh)
        .start(shutdown.clone())
        .await?;

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("interrupt received, shutting down");
            shutdown.cancel();
        }
    });

    handle.wait().await
}
