use energy_client::{
    db::measurement_queries::{fetch_latest, fetch_since},
    timestamp, Measurement, SqlitePool,
};
use serde::Serialize;
use time::{Duration, PrimitiveDateTime};

use super::{
    decimate::{decimate, DecimationSettings},
    lookback::{self, Lookback},
};
use crate::{config::DashboardConfig, format::format_value};

/// Single-value readouts for the newest row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LatestReadout {
    pub timestamp: Option<String>,
    pub voltage: String,
    pub current: String,
    pub power: String,
    pub energy: String,
    pub frequency: String,
    pub pf: String,
    pub cost: String,
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChartPanel {
    pub metric: &'static str,
    pub title: &'static str,
    pub values: Vec<f64>,
}

/// Everything needed to draw the stacked chart. All panels share
/// `timestamps`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChartView {
    pub lookback: Lookback,
    pub window_start: String,
    /// Rows in the window before decimation.
    pub raw_points: usize,
    pub timestamps: Vec<String>,
    pub panels: Vec<ChartPanel>,
    pub error: Option<String>,
}

impl ChartView {
    pub fn auto_refresh(&self) -> bool {
        self.lookback.auto_refresh
    }
}

/// Plotted metrics, top to bottom.
pub const CHART_METRICS: [(&str, &str, fn(&Measurement) -> f64); 5] = [
    ("current", "Current (A)", |m| m.current),
    ("power", "Power (W)", |m| m.power),
    ("energy", "Energy (kWh)", |m| m.energy),
    ("pf", "Power Factor", |m| m.pf),
    ("cost", "Cost (€)", |m| m.cost),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChartSettings {
    pub default_lookback_minutes: u32,
    pub max_auto_refresh_minutes: u32,
    pub decimation: DecimationSettings,
}

impl Default for ChartSettings {
    fn default() -> Self {
        Self {
            default_lookback_minutes: lookback::DEFAULT_LOOKBACK_MINUTES,
            max_auto_refresh_minutes: lookback::MAX_AUTO_REFRESH_MINUTES,
            decimation: DecimationSettings::default(),
        }
    }
}

impl From<&DashboardConfig> for ChartSettings {
    fn from(cfg: &DashboardConfig) -> Self {
        Self {
            default_lookback_minutes: cfg.default_lookback_minutes,
            max_auto_refresh_minutes: cfg.max_auto_refresh_minutes,
            decimation: DecimationSettings {
                max_points: cfg.max_points,
                window: cfg.smoothing_window,
            },
        }
    }
}

impl ChartSettings {
    pub fn resolve(&self, input: &str) -> Lookback {
        lookback::resolve(input, self.default_lookback_minutes, self.max_auto_refresh_minutes)
    }
}

pub fn latest_readout(row: Option<&Measurement>) -> LatestReadout {
    let value = |f: fn(&Measurement) -> f64| row.map(f).unwrap_or(0.0);

    LatestReadout {
        timestamp: row.map(|m| timestamp::format(m.timestamp)),
        voltage: format_value(value(|m| m.voltage), 2),
        current: format_value(value(|m| m.current), 3),
        power: format_value(value(|m| m.power), 2),
        energy: format_value(value(|m| m.energy), 3),
        frequency: format_value(value(|m| m.frequency), 2),
        pf: format_value(value(|m| m.pf), 2),
        cost: format_value(value(|m| m.cost), 4),
        error: None,
    }
}

/// Latest-values refresh. Query failures render as placeholders plus an
/// error message.
pub async fn latest_cycle(pool: &SqlitePool) -> LatestReadout {
    match fetch_latest(pool).await {
        Ok(row) => latest_readout(row.as_ref()),
        Err(e) => {
            metrics::counter!("dashboard_query_errors_total").increment(1);
            tracing::warn!(error = %e, "latest measurement query failed");
            LatestReadout {
                error: Some(format!("{e:#}")),
                ..latest_readout(None)
            }
        }
    }
}

pub fn window_start(now: PrimitiveDateTime, minutes: u32) -> PrimitiveDateTime {
    now.checked_sub(Duration::minutes(i64::from(minutes)))
        .unwrap_or(PrimitiveDateTime::MIN)
}

/// Filter to the window, order by time, decimate and split into panels.
pub fn build_chart(
    mut rows: Vec<Measurement>,
    start: PrimitiveDateTime,
    lookback: Lookback,
    decimation: DecimationSettings,
) -> ChartView {
    rows.retain(|m| m.timestamp >= start);
    rows.sort_by_key(|m| m.timestamp);
    let raw_points = rows.len();

    let plotted = decimate(&rows, decimation);

    ChartView {
        lookback,
        window_start: timestamp::format(start),
        raw_points,
        timestamps: plotted.iter().map(|m| timestamp::format(m.timestamp)).collect(),
        panels: CHART_METRICS
            .iter()
            .map(|&(metric, title, value)| ChartPanel {
                metric,
                title,
                values: plotted.iter().map(value).collect(),
            })
            .collect(),
        error: None,
    }
}

/// Chart refresh for the given lookback input at `now`.
pub async fn chart_cycle(
    pool: &SqlitePool,
    input: &str,
    now: PrimitiveDateTime,
    settings: &ChartSettings,
) -> ChartView {
    let lookback = settings.resolve(input);
    let start = window_start(now, lookback.minutes);

    match fetch_since(pool, start).await {
        Ok(rows) => {
            tracing::debug!(
                window_start = %timestamp::format(start),
                rows = rows.len(),
                "fetched chart window"
            );
            build_chart(rows, start, lookback, settings.decimation)
        }
        Err(e) => {
            metrics::counter!("dashboard_query_errors_total").increment(1);
            tracing::warn!(error = %e, "chart query failed");
            ChartView {
                error: Some(format!("{e:#}")),
                ..build_chart(Vec::new(), start, lookback, settings.decimation)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use energy_client::db::{connect_in_memory, measurement_queries::insert_measurement, schema::ensure_schema};
    use time::macros::datetime;

    fn measurement(ts: PrimitiveDateTime, power: f64) -> Measurement {
        Measurement {
            timestamp: ts,
            voltage: 230.0,
            current: power / 230.0,
            power,
            energy: 1.5,
            frequency: 50.0,
            pf: 0.95,
            cost: 0.45,
        }
    }

    #[test]
    fn latest_readout_without_rows_is_all_placeholders() {
        let r = latest_readout(None);
        assert_eq!(r.timestamp, None);
        assert_eq!(r.voltage, "0.00");
        assert_eq!(r.current, "0.000");
        assert_eq!(r.energy, "0.000");
        assert_eq!(r.cost, "0.0000");
        assert_eq!(r.error, None);
    }

    #[test]
    fn latest_readout_formats_precision_per_field() {
        let m = measurement(datetime!(2024-06-01 09:15:30), 460.0);
        let r = latest_readout(Some(&m));

        assert_eq!(r.timestamp.as_deref(), Some("2024-06-01 09:15:30"));
        assert_eq!(r.power, "460.00");
        assert_eq!(r.current, "2.000");
        assert_eq!(r.pf, "0.95");
        assert_eq!(r.cost, "0.4500");
    }

    #[tokio::test]
    async fn latest_cycle_on_empty_table_renders_defaults() {
        let pool = connect_in_memory().await.unwrap();
        ensure_schema(&pool).await.unwrap();

        assert_eq!(latest_cycle(&pool).await, latest_readout(None));
    }

    #[tokio::test]
    async fn query_failures_render_an_error_state() {
        // No schema, so both queries fail.
        let pool = connect_in_memory().await.unwrap();

        let latest = latest_cycle(&pool).await;
        assert!(latest.error.is_some());
        assert_eq!(latest.voltage, "0.00");

        let chart = chart_cycle(&pool, "15", datetime!(2024-01-01 12:00:00), &ChartSettings::default()).await;
        assert!(chart.error.is_some());
        assert!(chart.timestamps.is_empty());
        assert_eq!(chart.panels.len(), 5);
    }

    #[test]
    fn build_chart_filters_and_orders_rows() {
        let start = datetime!(2024-01-01 12:00:00);
        let rows = vec![
            measurement(datetime!(2024-01-01 12:00:02), 2.0),
            measurement(datetime!(2024-01-01 11:59:59), 99.0),
            measurement(datetime!(2024-01-01 12:00:00), 0.0),
            measurement(datetime!(2024-01-01 12:00:01), 1.0),
        ];
        let lookback = ChartSettings::default().resolve("15");

        let view = build_chart(rows, start, lookback, DecimationSettings::default());

        assert_eq!(view.raw_points, 3);
        assert_eq!(
            view.timestamps,
            vec!["2024-01-01 12:00:00", "2024-01-01 12:00:01", "2024-01-01 12:00:02"]
        );
        let power = view.panels.iter().find(|p| p.metric == "power").unwrap();
        assert_eq!(power.values, vec![0.0, 1.0, 2.0]);
        let titles: Vec<&str> = view.panels.iter().map(|p| p.title).collect();
        assert_eq!(titles, vec!["Current (A)", "Power (W)", "Energy (kWh)", "Power Factor", "Cost (€)"]);
    }

    #[tokio::test]
    async fn chart_cycle_uses_lookback_window() {
        let pool = connect_in_memory().await.unwrap();
        ensure_schema(&pool).await.unwrap();
        let now = datetime!(2024-01-01 12:00:00);
        for minutes_ago in [1i64, 10, 20, 90] {
            insert_measurement(&pool, &measurement(now - Duration::minutes(minutes_ago), minutes_ago as f64))
                .await
                .unwrap();
        }

        let view = chart_cycle(&pool, "15", now, &ChartSettings::default()).await;
        assert_eq!(view.raw_points, 2);
        assert!(view.auto_refresh());

        // Garbage falls back to 15 minutes.
        let view = chart_cycle(&pool, "10*10", now, &ChartSettings::default()).await;
        assert_eq!(view.lookback.minutes, 15);
        assert_eq!(view.raw_points, 2);

        let view = chart_cycle(&pool, "120", now, &ChartSettings::default()).await;
        assert_eq!(view.raw_points, 4);
        assert!(!view.auto_refresh());
    }

    #[test]
    fn window_start_saturates() {
        let now = datetime!(2024-01-01 12:00:00);
        assert_eq!(window_start(now, 15), datetime!(2024-01-01 11:45:00));
        assert!(window_start(now, u32::MAX) < now);
    }
}
