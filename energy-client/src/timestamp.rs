//! The `timestamp` column is stored as `TEXT` in `YYYY-MM-DD HH:MM:SS` form
//! (UTC, whole seconds), so string comparison in SQL orders rows by time.

use std::time::SystemTime;

use time::{macros::format_description, Duration, OffsetDateTime, PrimitiveDateTime};

#[derive(thiserror::Error, Debug)]
#[error("invalid timestamp '{value}': {source}")]
pub struct TimestampError {
    value: String,
    #[source]
    source: time::error::Parse,
}

pub fn format(ts: PrimitiveDateTime) -> String {
    ts.format(format_description!("[year]-[month]-[day] [hour]:[minute]:[second]"))
        .unwrap_or_else(|_| ts.to_string())
}

/// Parses a stored timestamp. Rows written with fractional seconds are
/// accepted and truncated to the second.
pub fn parse(raw: &str) -> Result<PrimitiveDateTime, TimestampError> {
    let raw = raw.trim();
    match PrimitiveDateTime::parse(raw, format_description!("[year]-[month]-[day] [hour]:[minute]:[second]")) {
        Ok(ts) => Ok(ts),
        Err(_) => PrimitiveDateTime::parse(
            raw,
            format_description!("[year]-[month]-[day] [hour]:[minute]:[second].[subsecond]"),
        )
        .map(truncate_to_second)
        .map_err(|source| TimestampError {
            value: raw.to_string(),
            source,
        }),
    }
}

pub fn from_system_time(t: SystemTime) -> PrimitiveDateTime {
    let utc = OffsetDateTime::from(t);
    truncate_to_second(PrimitiveDateTime::new(utc.date(), utc.time()))
}

pub fn now() -> PrimitiveDateTime {
    from_system_time(SystemTime::now())
}

fn truncate_to_second(ts: PrimitiveDateTime) -> PrimitiveDateTime {
    ts - Duration::nanoseconds(i64::from(ts.nanosecond()))
}
