//! The dashboard's data sources: one fetch function per source plus the
//! snapshot slots the pollers write into.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::info;

use crate::analytics::mapper::{map_orders, map_positions, map_trades, MapContext};
use crate::analytics::usage::{provider_days, router_days};
use crate::config::Config;
use crate::error::FetchError;
use crate::gmx::GmxClient;
use crate::poller::{spawn_poller, Snapshot};
use crate::telemetry::{provider_fetch_range, TelemetryClient};
use crate::types::{OrderRecord, PositionRecord, ThoughtsDocument, TradeRecord, UsageDayRecord};

/// Latest result per source. Cloning shares the slots.
#[derive(Clone, Default)]
pub struct Sources {
    pub trades: Arc<Snapshot<Vec<TradeRecord>>>,
    pub positions: Arc<Snapshot<Vec<PositionRecord>>>,
    pub orders: Arc<Snapshot<Vec<OrderRecord>>>,
    pub router_usage: Arc<Snapshot<Vec<UsageDayRecord>>>,
    pub provider_usage: Arc<Snapshot<Vec<UsageDayRecord>>>,
    pub thoughts: Arc<Snapshot<ThoughtsDocument>>,
}

pub async fn fetch_trades(gmx: &GmxClient) -> Result<Vec<TradeRecord>, FetchError> {
    let catalog = gmx.catalog().await?;
    let raws = gmx.trade_actions(&catalog).await?;
    let ctx = MapContext { markets: &catalog.directory, now: Utc::now().timestamp() };
    Ok(map_trades(&raws, &ctx))
}

pub async fn fetch_positions(gmx: &GmxClient) -> Result<Vec<PositionRecord>, FetchError> {
    let catalog = gmx.catalog().await?;
    let raws = gmx.positions(&catalog).await?;
    let ctx = MapContext { markets: &catalog.directory, now: Utc::now().timestamp() };
    Ok(map_positions(&raws, &ctx))
}

pub async fn fetch_orders(gmx: &GmxClient) -> Result<Vec<OrderRecord>, FetchError> {
    let catalog = gmx.catalog().await?;
    let raws = gmx.pending_orders(&catalog).await?;
    let ctx = MapContext { markets: &catalog.directory, now: Utc::now().timestamp() };
    Ok(map_orders(&raws, &ctx))
}

pub async fn fetch_router_usage(
    telemetry: &TelemetryClient,
    model_filter: Option<&str>,
) -> Result<Vec<UsageDayRecord>, FetchError> {
    let response = telemetry.router_usage().await?;
    Ok(router_days(&response, model_filter))
}

/// Fetches a range covering every window; handlers narrow it per request.
pub async fn fetch_provider_usage(telemetry: &TelemetryClient) -> Result<Vec<UsageDayRecord>, FetchError> {
    let (start, end) = provider_fetch_range(Utc::now().date_naive());
    let response = telemetry.provider_usage(start, end).await?;
    Ok(provider_days(&response))
}

pub async fn fetch_thoughts(telemetry: &TelemetryClient) -> Result<ThoughtsDocument, FetchError> {
    Ok(telemetry.thoughts().await?.unwrap_or_default())
}

/// Start one poller per source.
pub fn spawn_all(
    cfg: &Config,
    gmx: GmxClient,
    telemetry: TelemetryClient,
    sources: &Sources,
    refresh: Arc<Notify>,
) -> Vec<JoinHandle<()>> {
    let retries = cfg.fetch_retries;
    let secs = |s: u64| Duration::from_secs(s.max(1));
    let mut handles = Vec::new();

    let client = gmx.clone();
    handles.push(spawn_poller(
        "trades",
        secs(cfg.history_poll_secs),
        retries,
        sources.trades.clone(),
        refresh.clone(),
        move || {
            let client = client.clone();
            async move { fetch_trades(&client).await }
        },
    ));

    let client = gmx.clone();
    handles.push(spawn_poller(
        "positions",
        secs(cfg.positions_poll_secs),
        retries,
        sources.positions.clone(),
        refresh.clone(),
        move || {
            let client = client.clone();
            async move { fetch_positions(&client).await }
        },
    ));

    let client = gmx;
    handles.push(spawn_poller(
        "orders",
        secs(cfg.orders_poll_secs),
        retries,
        sources.orders.clone(),
        refresh.clone(),
        move || {
            let client = client.clone();
            async move { fetch_orders(&client).await }
        },
    ));

    let client = telemetry.clone();
    let model_filter = cfg.router_model_filter.clone();
    handles.push(spawn_poller(
        "router usage",
        secs(cfg.router_usage_poll_secs),
        retries,
        sources.router_usage.clone(),
        refresh.clone(),
        move || {
            let client = client.clone();
            let model_filter = model_filter.clone();
            async move { fetch_router_usage(&client, model_filter.as_deref()).await }
        },
    ));

    let client = telemetry.clone();
    handles.push(spawn_poller(
        "provider usage",
        secs(cfg.provider_usage_poll_secs),
        retries,
        sources.provider_usage.clone(),
        refresh.clone(),
        move || {
            let client = client.clone();
            async move { fetch_provider_usage(&client).await }
        },
    ));

    let client = telemetry;
    handles.push(spawn_poller(
        "thoughts",
        secs(cfg.thoughts_poll_secs),
        retries,
        sources.thoughts.clone(),
        refresh,
        move || {
            let client = client.clone();
            async move { fetch_thoughts(&client).await }
        },
    ));

    info!("Started {} pollers", handles.len());
    handles
}
