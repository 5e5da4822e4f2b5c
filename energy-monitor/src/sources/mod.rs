pub mod mqtt;

pub use mqtt::MqttSource;

/// A payload as delivered by the broker, not yet decoded.
#[derive(Debug, Clone)]
pub struct RawMessage {
    pub topic: String,
    pub payload: Vec<u8>,
}
