use std::{convert::Infallible, sync::Arc, time::Duration};

use anyhow::Result;
use askama::Template;
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{
        sse::{Event, KeepAlive, Sse},
        Html,
    },
    routing::get,
    Json, Router,
};
use energy_client::{timestamp, SqlitePool};
use futures::{stream, Stream};
use serde::Deserialize;
use tokio::{net::TcpListener, sync::watch, task::JoinHandle};
use tokio_util::sync::CancellationToken;

use super::{
    cycles::{build_chart, chart_cycle, latest_cycle, latest_readout, window_start, ChartSettings, ChartView, LatestReadout},
    scheduler::{OverrunPolicy, RepeatingTimer},
};
use crate::config::DashboardConfig;

/// Owns the storage pool and runs the latest-values cycle.
pub struct DashboardService {
    pool: SqlitePool,
    cfg: DashboardConfig,
}

/// Shared with the HTTP handlers. Chart cycles are started per page
/// connection from here, so each page keeps its own lookback.
#[derive(Clone)]
pub struct DashboardState {
    pool: SqlitePool,
    latest: watch::Receiver<LatestReadout>,
    settings: ChartSettings,
    chart_period: Duration,
    latest_interval_ms: u64,
    initial_lookback: Arc<str>,
    shutdown: CancellationToken,
}

#[derive(Template)]
#[template(path = "index.html")]
struct IndexTemplate<'a> {
    latest_interval_ms: u64,
    initial_lookback: &'a str,
}

#[derive(Deserialize)]
struct ChartQuery {
    minutes: Option<String>,
}

impl DashboardService {
    pub fn new(pool: SqlitePool, cfg: DashboardConfig) -> Self {
        Self { pool, cfg }
    }

    /// Spawn the latest-values cycle. It and every chart stream stop when
    /// `shutdown` is cancelled.
    pub fn start(self, shutdown: CancellationToken) -> (DashboardState, Vec<JoinHandle<()>>) {
        let (latest_tx, latest_rx) = watch::channel(latest_readout(None));

        let tasks = vec![tokio::spawn(run_latest_cycle(
            self.pool.clone(),
            Duration::from_millis(self.cfg.latest_interval_ms),
            latest_tx,
            shutdown.clone(),
        ))];

        let state = DashboardState {
            settings: ChartSettings::from(&self.cfg),
            chart_period: Duration::from_millis(self.cfg.chart_interval_ms),
            latest_interval_ms: self.cfg.latest_interval_ms,
            initial_lookback: self.cfg.initial_lookback.as_str().into(),
            pool: self.pool,
            latest: latest_rx,
            shutdown,
        };

        (state, tasks)
    }
}

impl DashboardState {
    fn lookback_input(&self, query: ChartQuery) -> String {
        query.minutes.unwrap_or_else(|| self.initial_lookback.to_string())
    }
}

async fn run_latest_cycle(
    pool: SqlitePool,
    period: Duration,
    out: watch::Sender<LatestReadout>,
    shutdown: CancellationToken,
) {
    let mut timer = RepeatingTimer::new(period, OverrunPolicy::Skip);
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = timer.tick() => {}
        }
        out.send_replace(latest_cycle(&pool).await);
    }
}

/// Re-runs on every tick and on every lookback change. A lookback past the
/// auto-refresh limit switches the timer off until the input changes again.
async fn run_chart_cycle(
    pool: SqlitePool,
    settings: ChartSettings,
    period: Duration,
    mut input: watch::Receiver<String>,
    out: watch::Sender<ChartView>,
    shutdown: CancellationToken,
) {
    let mut timer = RepeatingTimer::new(period, OverrunPolicy::Skip);
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = timer.tick() => {}
            changed = input.changed() => {
                if changed.is_err() {
                    break;
                }
            }
        }

        let lookback_input = input.borrow_and_update().clone();
        let view = chart_cycle(&pool, &lookback_input, timestamp::now(), &settings).await;

        if timer.is_enabled() && !view.auto_refresh() {
            tracing::info!(
                minutes = view.lookback.minutes,
                "lookback exceeds auto-refresh limit, chart frozen until input changes"
            );
        }
        timer.set_enabled(view.auto_refresh());
        out.send_replace(view);
    }
}

pub fn router(state: DashboardState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/healthz", get(healthz))
        .route("/api/latest", get(latest))
        .route("/api/chart", get(chart))
        .route("/api/chart/stream", get(chart_stream))
        .with_state(state)
}

/// Serve until `shutdown` is cancelled.
pub async fn serve(listener: TcpListener, state: DashboardState, shutdown: CancellationToken) -> Result<()> {
    axum::serve(listener, router(state).into_make_service())
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;
    Ok(())
}

async fn index(State(state): State<DashboardState>) -> Result<Html<String>, (StatusCode, &'static str)> {
    let page = IndexTemplate {
        latest_interval_ms: state.latest_interval_ms,
        initial_lookback: &state.initial_lookback,
    };
    match page.render() {
        Ok(body) => Ok(Html(body)),
        Err(e) => {
            tracing::error!(error = %e, "render index template");
            Err((StatusCode::INTERNAL_SERVER_ERROR, "internal server error"))
        }
    }
}

async fn healthz() -> &'static str {
    "ok"
}

async fn latest(State(state): State<DashboardState>) -> Json<LatestReadout> {
    let readout = state.latest.borrow().clone();
    Json(readout)
}

/// One chart refresh for `?minutes=`, falling back to the configured initial
/// lookback.
async fn chart(State(state): State<DashboardState>, Query(query): Query<ChartQuery>) -> Json<ChartView> {
    let input = state.lookback_input(query);
    Json(chart_cycle(&state.pool, &input, timestamp::now(), &state.settings).await)
}

/// Runs a chart cycle for this connection only and pushes every view as a
/// `chart` event. The cycle stops when the client goes away.
async fn chart_stream(
    State(state): State<DashboardState>,
    Query(query): Query<ChartQuery>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let input = state.lookback_input(query);
    let initial = state.settings.resolve(&input);
    tracing::debug!(%input, minutes = initial.minutes, "chart stream opened");

    let placeholder = build_chart(
        Vec::new(),
        window_start(timestamp::now(), initial.minutes),
        initial,
        state.settings.decimation,
    );
    let (input_tx, input_rx) = watch::channel(input);
    let (view_tx, view_rx) = watch::channel(placeholder);
    let cancel = state.shutdown.child_token();

    tokio::spawn(run_chart_cycle(
        state.pool.clone(),
        state.settings,
        state.chart_period,
        input_rx,
        view_tx,
        cancel.clone(),
    ));

    // The stream owns the input sender and the guard, so dropping the
    // connection cancels the cycle.
    let events = stream::unfold(
        (view_rx, input_tx, cancel.drop_guard()),
        |(mut views, input_tx, guard)| async move {
            views.changed().await.ok()?;
            let view = views.borrow_and_update().clone();
            let event = match Event::default().event("chart").json_data(&view) {
                Ok(event) => event,
                Err(e) => {
                    tracing::warn!(error = %e, "encode chart event");
                    Event::default().event("chart-error").data(e.to_string())
                }
            };
            Some((Ok::<_, Infallible>(event), (views, input_tx, guard)))
        },
    );

    Sse::new(events).keep_alive(KeepAlive::default())
}
