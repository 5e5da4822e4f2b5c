use anyhow::Result;
use sqlx::SqlitePool;
use time::PrimitiveDateTime;

use crate::{domain::Measurement, timestamp};

/// All rows with `timestamp >= start`, in storage order. Callers sort if they
/// need time order.
pub async fn fetch_since(pool: &SqlitePool, start: PrimitiveDateTime) -> Result<Vec<Measurement>> {
    let rows = sqlx::query_as::<_, Measurement>(
        r#"
        SELECT
            timestamp,
            voltage,
            current,
            power,
            energy,
            frequency,
            pf,
            cost
        FROM energy_measurements
        WHERE timestamp >= ?
        "#,
    )
    .bind(timestamp::format(start))
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// The row with the greatest timestamp, or `None` when nothing has been
/// ingested yet.
pub async fn fetch_latest(pool: &SqlitePool) -> Result<Option<Measurement>> {
    let row = sqlx::query_as::<_, Measurement>(
        r#"
        SELECT
            timestamp,
            voltage,
            current,
            power,
            energy,
            frequency,
            pf,
            cost
        FROM energy_measurements
        ORDER BY timestamp DESC
        LIMIT 1
        "#,
    )
    .fetch_optional(pool)
    .await?;

    Ok(row)
}

/// Append one row. A single statement, so it commits as its own transaction.
pub async fn insert_measurement(pool: &SqlitePool, m: &Measurement) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO energy_measurements
            (timestamp, voltage, current, power, energy, frequency, pf, cost)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(timestamp::format(m.timestamp))
    .bind(m.voltage)
    .bind(m.current)
    .bind(m.power)
    .bind(m.energy)
    .bind(m.frequency)
    .bind(m.pf)
    .bind(m.cost)
    .execute(pool)
    .await
    .map(|_| ())
}
