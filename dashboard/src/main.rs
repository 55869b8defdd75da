use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;
use tokio::sync::Notify;
use tracing::{info, warn};

use vega_dashboard::analytics::metrics::compute_metrics;
use vega_dashboard::analytics::series::{build_series, final_pnl};
use vega_dashboard::analytics::usage::{aggregate_usage_with_adjustment, filter_usage_days};
use vega_dashboard::analytics::window::{cutoff_timestamp, filter_by_window, DateWindow};
use vega_dashboard::config::Config;
use vega_dashboard::error::FetchError;
use vega_dashboard::gmx::GmxClient;
use vega_dashboard::poller::fetch_with_retry;
use vega_dashboard::report::DashboardReport;
use vega_dashboard::server::{self, AppState};
use vega_dashboard::sources::{self, Sources};
use vega_dashboard::telemetry::TelemetryClient;

#[derive(Parser)]
#[command(name = "vega-dashboard", about = "Read-only dashboard for the Vega GMX trading agent")]
struct Cli {
    /// Fetch every source once, print a report and exit
    #[arg(long)]
    once: bool,

    /// Override the listen port
    #[arg(long)]
    port: Option<u16>,

    /// Load config from a specific .env file
    #[arg(long)]
    config_file: Option<String>,

    /// Report period for --once: all, 1d, 7d or 30d
    #[arg(long, default_value = "1d")]
    period: DateWindow,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cli = Cli::parse();
    let mut cfg = Config::from_env_file(cli.config_file.as_deref())?;
    if let Some(port) = cli.port {
        cfg.port = port;
    }

    let gmx = GmxClient::new(
        &cfg.gmx_oracle_url,
        &cfg.gmx_subsquid_url,
        cfg.wallet_address.clone(),
        cfg.history_page_size,
    );
    let telemetry = TelemetryClient::new(&cfg.proxy_base_url);

    if gmx.is_configured() {
        info!("Tracking wallet {}", cfg.wallet_address.as_deref().unwrap_or_default());
    } else {
        warn!("GMX_WALLET_ADDRESS not set: positions, orders and history will be empty");
    }

    if cli.once {
        let report = run_once(&cfg, &gmx, &telemetry, cli.period).await;
        println!("{report}");
        return Ok(());
    }

    let sources = Sources::default();
    let refresh = Arc::new(Notify::new());
    let pollers = sources::spawn_all(&cfg, gmx, telemetry, &sources, refresh.clone());

    let state = AppState {
        sources,
        refresh,
        usage_adjustment_usd: cfg.usage_cost_adjustment_usd,
        started_at: Instant::now(),
    };
    let app = server::router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], cfg.port));
    info!("══════════════════════════════════════════════");
    info!("  Vega Trading Dashboard v{}", env!("CARGO_PKG_VERSION"));
    info!("  http://localhost:{}", cfg.port);
    info!("  Proxy: {}", cfg.proxy_base_url);
    info!(
        "  Polling: positions {}s | orders {}s | history {}s",
        cfg.positions_poll_secs, cfg.orders_poll_secs, cfg.history_poll_secs
    );
    info!("══════════════════════════════════════════════");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    for poller in pollers {
        poller.abort();
    }
    info!("Dashboard stopped");
    Ok(())
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c().await.ok();
    info!("STOP SIGNAL (Ctrl+C)");
}

/// A failed source is reported and treated as empty.
fn or_empty<T: Default>(source: &str, result: Result<T, FetchError>) -> T {
    result.unwrap_or_else(|e| {
        warn!("{source} unavailable: {e}");
        T::default()
    })
}

async fn run_once(cfg: &Config, gmx: &GmxClient, telemetry: &TelemetryClient, window: DateWindow) -> DashboardReport {
    let retries = cfg.fetch_retries;
    let model_filter = cfg.router_model_filter.as_deref();

    let fetch_trades = || sources::fetch_trades(gmx);
    let fetch_positions = || sources::fetch_positions(gmx);
    let fetch_orders = || sources::fetch_orders(gmx);
    let fetch_router = || sources::fetch_router_usage(telemetry, model_filter);
    let fetch_provider = || sources::fetch_provider_usage(telemetry);
    let fetch_thoughts = || sources::fetch_thoughts(telemetry);

    let (trades, positions, orders, router, provider, thoughts) = tokio::join!(
        fetch_with_retry("trades", retries, &fetch_trades),
        fetch_with_retry("positions", retries, &fetch_positions),
        fetch_with_retry("orders", retries, &fetch_orders),
        fetch_with_retry("router usage", retries, &fetch_router),
        fetch_with_retry("provider usage", retries, &fetch_provider),
        fetch_with_retry("thoughts", retries, &fetch_thoughts),
    );

    let now = Utc::now();
    let trades = filter_by_window(&or_empty("trades", trades), cutoff_timestamp(window, now.timestamp()));
    let positions = or_empty("positions", positions);
    let router = filter_usage_days(&or_empty("router usage", router), window, now);
    let provider = filter_usage_days(&or_empty("provider usage", provider), window, now);
    let thoughts = or_empty("thoughts", thoughts);

    DashboardReport {
        window,
        metrics: compute_metrics(&trades),
        final_pnl: final_pnl(&build_series(&trades)),
        open_positions: positions.len(),
        unrealized_pnl: positions.iter().map(|p| p.unrealized_pnl).sum(),
        pending_orders: or_empty("orders", orders).len(),
        usage: aggregate_usage_with_adjustment(&router, &provider, cfg.usage_cost_adjustment_usd),
        latest_thought: thoughts.thoughts.last().map(|t| t.content.clone()),
    }
}
