use std::{pin::Pin, sync::Arc, time::{Duration, SystemTime}};

use futures::{Stream, StreamExt};
use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Packet, QoS};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;

use super::RawMessage;
use crate::{
    config::MqttConfig,
    pipeline::{Envelope, PipelineError, Source},
};

/// Pause between polls after a connection error. The event loop reconnects
/// on the next poll.
const RECONNECT_DELAY: Duration = Duration::from_secs(1);

/// Subscribes to one topic and yields every publish on it, stamped with the
/// time it was received.
///
/// The broker event loop runs on its own task until `shutdown` is cancelled;
/// the stream ends once that task stops.
pub struct MqttSource {
    receiver: Arc<tokio::sync::Mutex<Option<mpsc::Receiver<Envelope<RawMessage>>>>>,
}

impl MqttSource {
    pub fn new(cfg: &MqttConfig, shutdown: CancellationToken) -> Self {
        let mut options = MqttOptions::new(cfg.client_id.clone(), cfg.host.clone(), cfg.port);
        options.set_keep_alive(Duration::from_secs(cfg.keep_alive_secs));

        let (client, eventloop) = AsyncClient::new(options, 10);
        let (tx, rx) = mpsc::channel(cfg.channel_capacity);

        tracing::info!(host = %cfg.host, port = cfg.port, topic = %cfg.topic, "starting mqtt source");
        tokio::spawn(drive_event_loop(client, eventloop, cfg.topic.clone(), tx, shutdown));

        Self {
            receiver: Arc::new(tokio::sync::Mutex::new(Some(rx))),
        }
    }
}

async fn drive_event_loop(
    client: AsyncClient,
    mut eventloop: EventLoop,
    topic: String,
    tx: mpsc::Sender<Envelope<RawMessage>>,
    shutdown: CancellationToken,
) {
    loop {
        let event = tokio::select! {
            _ = shutdown.cancelled() => break,
            event = eventloop.poll() => event,
        };

        match event {
            Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                // Subscriptions do not survive a reconnect with a clean session.
                tracing::info!(code = ?ack.code, topic = %topic, "mqtt connected, subscribing");
                if let Err(e) = client.try_subscribe(topic.clone(), QoS::AtMostOnce) {
                    tracing::error!(error = %e, topic = %topic, "failed to queue mqtt subscription");
                }
            }
            Ok(Event::Incoming(Packet::Publish(publish))) => {
                metrics::counter!("mqtt_messages_received_total").increment(1);
                let env = Envelope {
                    payload: RawMessage {
                        topic: publish.topic,
                        payload: publish.payload.to_vec(),
                    },
                    received_at: SystemTime::now(),
                };
                if tx.send(env).await.is_err() {
                    tracing::debug!("mqtt source consumer dropped, stopping event loop");
                    break;
                }
            }
            Ok(_) => {}
            Err(e) => {
                tracing::warn!(error = %e, "mqtt connection error, waiting for reconnect");
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = tokio::time::sleep(RECONNECT_DELAY) => {}
                }
            }
        }
    }

    let _ = client.try_disconnect();
    tracing::info!("mqtt source stopped");
}

#[async_trait::async_trait]
impl Source<RawMessage> for MqttSource {
    async fn stream(
        &self,
    ) -> Pin<Box<dyn Stream<Item = Result<Envelope<RawMessage>, PipelineError>> + Send>> {
        let mut guard = self.receiver.lock().await;
        match guard.take() {
            Some(rx) => Box::pin(ReceiverStream::new(rx).map(Ok)),
            None => Box::pin(futures::stream::once(async {
                Err(PipelineError::Source(
                    "MqttSource stream already taken; only one consumer supported".to_string(),
                ))
            })),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unreachable_broker() -> MqttConfig {
        MqttConfig {
            host: "127.0.0.1".to_string(),
            port: 1,
            ..MqttConfig::default()
        }
    }

    #[tokio::test]
    async fn stream_ends_after_shutdown() {
        let shutdown = CancellationToken::new();
        let source = MqttSource::new(&unreachable_broker(), shutdown.clone());
        shutdown.cancel();

        let items: Vec<_> = source.stream().await.collect().await;
        assert!(items.is_empty());
    }

    #[tokio::test]
    async fn second_stream_reports_source_error() {
        let shutdown = CancellationToken::new();
        let source = MqttSource::new(&unreachable_broker(), shutdown.clone());
        shutdown.cancel();

        let _first = source.stream().await;
        let second: Vec<_> = source.stream().await.collect().await;

        assert_eq!(second.len(), 1);
        assert!(matches!(second[0], Err(PipelineError::Source(_))));
    }
}
