use futures::StreamExt;
use energy_client::{db::measurement_queries::insert_measurement, timestamp, Measurement, SqlitePool};

use crate::pipeline::{Envelope, PipelineError, Sink};

/// Appends one row per measurement.
///
/// Failed writes are logged and the row is dropped. There is no retry and no
/// buffering, so a failing database never stalls the broker connection.
pub struct SqliteSink {
    pool: SqlitePool,
}

impl SqliteSink {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn write(&self, env: &Envelope<Measurement>) -> Result<(), PipelineError> {
        match insert_measurement(&self.pool, &env.payload).await {
            Ok(()) => {
                metrics::counter!("sqlite_rows_written_total").increment(1);
                if let Ok(dur) = std::time::SystemTime::now().duration_since(env.received_at) {
                    metrics::histogram!("ingest_end_to_end_latency_seconds").record(dur.as_secs_f64());
                }
                Ok(())
            }
            Err(e) => {
                metrics::counter!("sqlite_write_errors_total").increment(1);
                Err(PipelineError::Sink(e.to_string()))
            }
        }
    }
}

#[async_trait::async_trait]
impl Sink<Measurement> for SqliteSink {
    async fn run<S>(&self, mut input: S) -> Result<(), PipelineError>
    where
        S: futures::Stream<Item = Result<Envelope<Measurement>, PipelineError>> + Send + Unpin + 'static,
    {
        while let Some(item) = input.next().await {
            let env = match item {
                Ok(env) => env,
                Err(e) => {
                    tracing::warn!(error = %e, "dropping message");
                    continue;
                }
            };

            if let Err(e) = self.write(&env).await {
                tracing::error!(
                    error = %e,
                    timestamp = %timestamp::format(env.payload.timestamp),
                    "failed to write measurement, dropping it"
                );
            }
        }

        Ok(())
    }
}
