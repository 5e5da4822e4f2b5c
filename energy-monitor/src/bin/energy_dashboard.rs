use std::net::SocketAddr;

use anyhow::{anyhow, bail, Result};
use energy_client::db::schema::ensure_schema;
use energy_monitor::{
    config::AppConfig,
    dashboard::{server, DashboardService},
    metrics_server, observability,
};
use tokio_util::sync::CancellationToken;

#[derive(Debug, Default, PartialEq)]
struct Args {
    port: Option<u16>,
    debug: bool,
}

fn parse_args<I>(args: I) -> Result<Args>
where
    I: IntoIterator<Item = String>,
{
    let mut parsed = Args::default();
    let mut args = args.into_iter();
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--debug" => parsed.debug = true,
            "--port" => {
                let value = args.next().ok_or_else(|| anyhow!("--port requires a value"))?;
                parsed.port = Some(value.parse().map_err(|e| anyhow!("invalid --port '{value}': {e}"))?);
            }
            other => bail!("usage: energy-dashboard [--port <port>] [--debug] (unexpected '{other}')"),
        }
    }
    Ok(parsed)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = parse_args(std::env::args().skip(1))?;
    observability::init_tracing(if args.debug {
        "energy_monitor=debug,energy_client=debug"
    } else {
        "energy_monitor=info"
    });

    let cfg = AppConfig::load()?;

    if let Some(metrics_cfg) = &cfg.metrics {
        metrics_server::init(&metrics_cfg.bind_addr)?;
    }

    let mut addr: SocketAddr = cfg
        .dashboard
        .bind_addr
        .parse()
        .map_err(|e| anyhow!("invalid dashboard.bind_addr: {e}"))?;
    if let Some(port) = args.port {
        addr.set_port(port);
    }

    let pool = energy_client::connect(&cfg.storage.path, cfg.storage.max_connections).await?;
    ensure_schema(&pool).await?;

    let shutdown = CancellationToken::new();
    let (state, tasks) = DashboardService::new(pool, cfg.dashboard.clone()).start(shutdown.clone());

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "dashboard listening");

    let on_interrupt = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("interrupt received, shutting down");
            on_interrupt.cancel();
        }
    });

    server::serve(listener, state, shutdown.clone()).await?;
    shutdown.cancel();
    for task in tasks {
        let _ = task.await;
    }

    Ok(())
}
