use std::sync::Arc;

use anyhow::Result;
use energy_client::{db::schema::ensure_schema, Measurement, SqlitePool};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::{
    config::MqttConfig,
    pipeline::{Pipeline, PipelineError, Source},
    sinks::SqliteSink,
    sources::{MqttSource, RawMessage},
    transform::{MeasurementDecoder, ProgressReporter},
};

/// Broker topic → decode and price → one row per message.
pub struct IngestService {
    pool: SqlitePool,
    mqtt: MqttConfig,
    cost_per_kwh: f64,
}

/// A running ingest service.
pub struct IngestHandle {
    shutdown: CancellationToken,
    task: JoinHandle<Result<(), PipelineError>>,
}

impl IngestService {
    pub fn new(pool: SqlitePool, mqtt: MqttConfig, cost_per_kwh: f64) -> Self {
        Self {
            pool,
            mqtt,
            cost_per_kwh,
        }
    }

    /// The ingest pipeline over an arbitrary source of raw messages.
    pub fn pipeline<S>(&self, source: S) -> Pipeline<S, RawMessage, Measurement, SqliteSink>
    where
        S: Source<RawMessage> + Send + Sync + 'static,
    {
        Pipeline {
            source,
            decode: Arc::new(MeasurementDecoder::new(self.cost_per_kwh)),
            transforms: vec![Arc::new(ProgressReporter)],
            sink: SqliteSink::new(self.pool.clone()),
        }
    }

    /// Create the schema, connect to the broker and start consuming. The
    /// service runs until `shutdown` is cancelled or [`IngestHandle::stop`] is
    /// called.
    pub async fn start(self, shutdown: CancellationToken) -> Result<IngestHandle> {
        ensure_schema(&self.pool).await?;
        tracing::info!(cost_per_kwh = self.cost_per_kwh, "measurement schema ready");

        let source = MqttSource::new(&self.mqtt, shutdown.clone());
        let pipeline = self.pipeline(source);
        let task = tokio::spawn(pipeline.run());

        Ok(IngestHandle { shutdown, task })
    }
}

impl IngestHandle {
    pub fn stop(&self) {
        self.shutdown.cancel();
    }

    /// Wait for the pipeline to drain after a stop.
    pub async fn wait(self) -> Result<()> {
        self.task.await??;
        tracing::info!("ingest service stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use energy_client::db::{connect_in_memory, measurement_queries::fetch_latest};

    #[tokio::test]
    async fn start_creates_schema_and_stop_drains() {
        let pool = connect_in_memory().await.unwrap();
        let mqtt = MqttConfig {
            host: "127.0.0.1".to_string(),
            port: 1,
            ..MqttConfig::default()
        };

        let handle = IngestService::new(pool.clone(), mqtt, 0.30)
            .start(CancellationToken::new())
            .await
            .unwrap();
        handle.stop();
        handle.wait().await.unwrap();

        assert!(fetch_latest(&pool).await.unwrap().is_none());
    }
}
