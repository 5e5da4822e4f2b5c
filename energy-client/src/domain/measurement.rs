use sqlx::{sqlite::SqliteRow, FromRow, Row};
use time::PrimitiveDateTime;

use crate::timestamp;

/// One row of `energy_measurements`. Rows are append-only.
#[derive(Debug, Clone, PartialEq)]
pub struct Measurement {
    /// Receipt time at the ingest service, UTC, whole seconds.
    pub timestamp: PrimitiveDateTime,
    pub voltage: f64,
    pub current: f64,
    pub power: f64,
    /// Cumulative kWh as reported by the meter.
    pub energy: f64,
    pub frequency: f64,
    pub pf: f64,
    /// `energy * cost_per_kwh`.
    pub cost: f64,
}

impl<'r> FromRow<'r, SqliteRow> for Measurement {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        let raw: String = row.try_get("timestamp")?;
        let timestamp = timestamp::parse(&raw).map_err(|e| sqlx::Error::ColumnDecode {
            index: "timestamp".to_string(),
            source: Box::new(e),
        })?;

        Ok(Measurement {
            timestamp,
            voltage: row.try_get("voltage")?,
            current: row.try_get("current")?,
            power: row.try_get("power")?,
            energy: row.try_get("energy")?,
            frequency: row.try_get("frequency")?,
            pf: row.try_get("pf")?,
            cost: row.try_get("cost")?,
        })
    }
}
