use energy_client::{timestamp, Measurement};
use serde_json::{Map, Value};

use crate::{
    format::progress_line,
    pipeline::{Envelope, PipelineError, Transform},
    sources::RawMessage,
};

pub const DEFAULT_COST_PER_KWH: f64 = 0.30;

/// Meter fields as published, before the ingest service stamps and prices them.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct MeterReading {
    pub voltage: f64,
    pub current: f64,
    pub power: f64,
    pub energy: f64,
    pub frequency: f64,
    pub pf: f64,
}

/// Decode a payload as UTF-8 text holding a JSON object.
pub fn decode_payload(bytes: &[u8]) -> Result<Map<String, Value>, PipelineError> {
    let text = std::str::from_utf8(bytes).map_err(|e| {
        PipelineError::Decode(format!(
            "payload is not valid UTF-8: {e}; payload: {}",
            String::from_utf8_lossy(bytes)
        ))
    })?;

    match serde_json::from_str::<Value>(text) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err(PipelineError::Decode(format!(
            "payload is not a JSON object; payload: {text}"
        ))),
        Err(e) => Err(PipelineError::Decode(format!(
            "malformed JSON: {e}; payload: {text}"
        ))),
    }
}

/// Numbers and numeric strings are accepted. An absent or `null` key yields
/// `None`.
fn numeric_field(map: &Map<String, Value>, key: &str) -> Result<Option<f64>, PipelineError> {
    let value = match map.get(key) {
        None | Some(Value::Null) => return Ok(None),
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
        Some(_) => None,
    };

    match value {
        Some(v) if v.is_finite() => Ok(Some(v)),
        _ => Err(PipelineError::Conversion(format!(
            "field '{key}' is not a finite number: {}",
            map.get(key).map(Value::to_string).unwrap_or_default()
        ))),
    }
}

/// Extract the six meter fields. Missing fields read as `0.0`, except
/// `energy`: without it no cost can be derived and the message is rejected.
pub fn reading_from_fields(map: &Map<String, Value>) -> Result<MeterReading, PipelineError> {
    let energy = numeric_field(map, "energy")?
        .ok_or_else(|| PipelineError::Conversion("field 'energy' is missing".to_string()))?;

    Ok(MeterReading {
        voltage: numeric_field(map, "voltage")?.unwrap_or_default(),
        current: numeric_field(map, "current")?.unwrap_or_default(),
        power: numeric_field(map, "power")?.unwrap_or_default(),
        energy,
        frequency: numeric_field(map, "frequency")?.unwrap_or_default(),
        pf: numeric_field(map, "pf")?.unwrap_or_default(),
    })
}

/// Stamp a reading with its receipt time and derive its cost.
pub fn enrich(reading: MeterReading, received_at: std::time::SystemTime, cost_per_kwh: f64) -> Measurement {
    Measurement {
        timestamp: timestamp::from_system_time(received_at),
        voltage: reading.voltage,
        current: reading.current,
        power: reading.power,
        energy: reading.energy,
        frequency: reading.frequency,
        pf: reading.pf,
        cost: reading.energy * cost_per_kwh,
    }
}

/// Turns raw broker messages into priced, timestamped measurements.
#[derive(Clone)]
pub struct MeasurementDecoder {
    cost_per_kwh: f64,
}

impl MeasurementDecoder {
    pub fn new(cost_per_kwh: f64) -> Self {
        Self { cost_per_kwh }
    }
}

impl Default for MeasurementDecoder {
    fn default() -> Self {
        Self::new(DEFAULT_COST_PER_KWH)
    }
}

#[async_trait::async_trait]
impl Transform<RawMessage, Measurement> for MeasurementDecoder {
    async fn apply(&self, input: Envelope<RawMessage>) -> Result<Envelope<Measurement>, PipelineError> {
        let result = decode_payload(&input.payload.payload).and_then(|map| reading_from_fields(&map));

        match result {
            Ok(reading) => Ok(Envelope {
                payload: enrich(reading, input.received_at, self.cost_per_kwh),
                received_at: input.received_at,
            }),
            Err(e) => {
                match &e {
                    PipelineError::Decode(_) => {
                        metrics::counter!("ingest_decode_errors_total").increment(1)
                    }
                    _ => metrics::counter!("ingest_conversion_errors_total").increment(1),
                }
                Err(e)
            }
        }
    }
}

/// Emits one human-readable line per measurement.
#[derive(Clone, Default)]
pub struct ProgressReporter;

#[async_trait::async_trait]
impl Transform<Measurement, Measurement> for ProgressReporter {
    async fn apply(&self, input: Envelope<Measurement>) -> Result<Envelope<Measurement>, PipelineError> {
        tracing::info!(target: "energy_monitor::progress", "{}", progress_line(&input.payload));
        Ok(input)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, SystemTime};
    use time::macros::datetime;

    fn envelope(payload: &[u8], received_at: SystemTime) -> Envelope<RawMessage> {
        Envelope {
            payload: RawMessage {
                topic: "home/energy_monitor".to_string(),
                payload: payload.to_vec(),
            },
            received_at,
        }
    }

    #[tokio::test]
    async fn decoder_prices_energy_and_stamps_receipt_time() {
        let at = SystemTime::UNIX_EPOCH + Duration::from_millis(1_700_000_000_250);
        let payload = br#"{"voltage": 230.4, "current": "1.25", "power": 288, "energy": 12.5, "pf": 0.96, "frequency": 50.02, "timestamp": "ignored"}"#;

        let env = MeasurementDecoder::default().apply(envelope(payload, at)).await.unwrap();
        let m = env.payload;

        assert_eq!(m.timestamp, datetime!(2023-11-14 22:13:20));
        assert_eq!(m.current, 1.25);
        assert_eq!(m.power, 288.0);
        assert_eq!(m.frequency, 50.02);
        assert!((m.cost - 12.5 * 0.30).abs() < 1e-12);
    }

    #[test]
    fn missing_optional_fields_default_to_zero() {
        let map = decode_payload(br#"{"energy": "3.0"}"#).unwrap();
        let reading = reading_from_fields(&map).unwrap();
        assert_eq!(
            reading,
            MeterReading {
                energy: 3.0,
                ..MeterReading::default()
            }
        );
    }

    #[test]
    fn missing_energy_is_a_conversion_error() {
        let map = decode_payload(br#"{"voltage": 230}"#).unwrap();
        assert!(matches!(reading_from_fields(&map), Err(PipelineError::Conversion(_))));
    }

    #[test]
    fn non_numeric_energy_is_a_conversion_error() {
        let map = decode_payload(br#"{"energy": "N/A"}"#).unwrap();
        assert!(matches!(reading_from_fields(&map), Err(PipelineError::Conversion(_))));

        let map = decode_payload(br#"{"energy": "nan"}"#).unwrap();
        assert!(matches!(reading_from_fields(&map), Err(PipelineError::Conversion(_))));

        let map = decode_payload(br#"{"energy": 1.0, "pf": [1]}"#).unwrap();
        assert!(matches!(reading_from_fields(&map), Err(PipelineError::Conversion(_))));
    }

    #[test]
    fn malformed_payloads_are_decode_errors() {
        assert!(matches!(decode_payload(b"{\"energy\": "), Err(PipelineError::Decode(_))));
        assert!(matches!(decode_payload(&[0xff, 0xfe, b'{']), Err(PipelineError::Decode(_))));
        assert!(matches!(decode_payload(b"[1, 2, 3]"), Err(PipelineError::Decode(_))));
    }

    #[tokio::test]
    async fn progress_reporter_passes_measurement_through() {
        let m = enrich(
            MeterReading {
                energy: 1.0,
                ..MeterReading::default()
            },
            SystemTime::UNIX_EPOCH,
            DEFAULT_COST_PER_KWH,
        );
        let env = Envelope {
            payload: m.clone(),
            received_at: SystemTime::UNIX_EPOCH,
        };

        let out = ProgressReporter.apply(env).await.unwrap();
        assert_eq!(out.payload, m);
    }
}
