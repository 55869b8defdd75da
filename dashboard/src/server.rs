use std::sync::Arc;
use std::time::Instant;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::Notify;
use tower_http::cors::CorsLayer;

use crate::analytics::history::history_view;
use crate::analytics::metrics::compute_metrics;
use crate::analytics::series::{build_series, final_pnl};
use crate::analytics::thoughts::{latest_thoughts, DEFAULT_THOUGHT_LIMIT};
use crate::analytics::usage::{aggregate_usage_with_adjustment, filter_usage_days, UsageView};
use crate::analytics::window::{cutoff_timestamp, filter_by_window, DateWindow};
use crate::poller::SnapshotState;
use crate::sources::Sources;
use crate::types::{PerformanceMetrics, SeriesPoint, Thought, TradeRecord};

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub sources: Sources,
    pub refresh: Arc<Notify>,
    pub usage_adjustment_usd: f64,
    pub started_at: Instant,
}

#[derive(Debug, Deserialize)]
pub struct PeriodQuery {
    /// `all`, `1d` (default), `7d` or `30d`
    pub period: Option<String>,
}

#[derive(Debug, Serialize)]
struct Envelope<T> {
    data: Option<T>,
    updated_at: Option<DateTime<Utc>>,
    error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    period: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    label: Option<&'static str>,
}

#[derive(Debug, Serialize)]
struct PnlChart {
    points: Vec<SeriesPoint>,
    final_pnl: f64,
}

#[derive(Debug, Serialize)]
struct ThoughtsBody {
    thoughts: Vec<Thought>,
    last_updated: Option<String>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/health", get(health))
        .route("/api/metrics", get(metrics))
        .route("/api/pnl-chart", get(pnl_chart))
        .route("/api/history", get(history))
        .route("/api/positions", get(positions))
        .route("/api/orders", get(orders))
        .route("/api/usage", get(usage))
        .route("/api/thoughts", get(thoughts))
        .route("/api/refresh", post(refresh))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

fn parse_window(query: &PeriodQuery) -> Result<DateWindow, Response> {
    match query.period.as_deref() {
        None | Some("") => Ok(DateWindow::default()),
        Some(raw) => raw
            .parse()
            .map_err(|msg: String| (StatusCode::BAD_REQUEST, Json(json!({ "error": msg }))).into_response()),
    }
}

/// Wrap derived data with its source's freshness. No data and a failure is
/// a bad gateway; no data and no failure means the first poll is pending.
fn respond<T: Serialize>(
    data: Option<T>,
    updated_at: Option<DateTime<Utc>>,
    error: Option<String>,
    window: Option<DateWindow>,
) -> Response {
    let status = match (&data, &error) {
        (Some(_), _) => StatusCode::OK,
        (None, Some(_)) => StatusCode::BAD_GATEWAY,
        (None, None) => StatusCode::SERVICE_UNAVAILABLE,
    };
    let body = Envelope {
        data,
        updated_at,
        error,
        period: window.map(|w| w.as_str()),
        label: window.map(|w| w.label()),
    };
    (status, Json(body)).into_response()
}

fn respond_snapshot<S, T: Serialize>(
    snapshot: &SnapshotState<S>,
    window: Option<DateWindow>,
    derive: impl FnOnce(&S) -> T,
) -> Response {
    respond(
        snapshot.data.as_ref().map(derive),
        snapshot.updated_at,
        snapshot.error.clone(),
        window,
    )
}

fn trades_in_window(trades: &[TradeRecord], window: DateWindow) -> Vec<TradeRecord> {
    filter_by_window(trades, cutoff_timestamp(window, Utc::now().timestamp()))
}

/// GET /api/health
async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "uptime_secs": state.started_at.elapsed().as_secs(),
    }))
}

/// GET /api/metrics?period=
async fn metrics(State(state): State<AppState>, Query(query): Query<PeriodQuery>) -> Response {
    let window = match parse_window(&query) {
        Ok(w) => w,
        Err(resp) => return resp,
    };
    let snapshot = state.sources.trades.read().await;
    respond_snapshot(&snapshot, Some(window), |trades| -> PerformanceMetrics {
        compute_metrics(&trades_in_window(trades, window))
    })
}

/// GET /api/pnl-chart?period=
async fn pnl_chart(State(state): State<AppState>, Query(query): Query<PeriodQuery>) -> Response {
    let window = match parse_window(&query) {
        Ok(w) => w,
        Err(resp) => return resp,
    };
    let snapshot = state.sources.trades.read().await;
    respond_snapshot(&snapshot, Some(window), |trades| {
        let points = build_series(&trades_in_window(trades, window));
        PnlChart { final_pnl: final_pnl(&points), points }
    })
}

/// GET /api/history?period=
async fn history(State(state): State<AppState>, Query(query): Query<PeriodQuery>) -> Response {
    let window = match parse_window(&query) {
        Ok(w) => w,
        Err(resp) => return resp,
    };
    let snapshot = state.sources.trades.read().await;
    respond_snapshot(&snapshot, Some(window), |trades| {
        history_view(&trades_in_window(trades, window))
    })
}

/// GET /api/positions
async fn positions(State(state): State<AppState>) -> Response {
    let snapshot = state.sources.positions.read().await;
    respond_snapshot(&snapshot, None, |positions| positions.clone())
}

/// GET /api/orders
async fn orders(State(state): State<AppState>) -> Response {
    let snapshot = state.sources.orders.read().await;
    respond_snapshot(&snapshot, None, |orders| orders.clone())
}

/// GET /api/usage?period=
///
/// Either source alone is enough to answer; a missing one counts as empty.
async fn usage(State(state): State<AppState>, Query(query): Query<PeriodQuery>) -> Response {
    let window = match parse_window(&query) {
        Ok(w) => w,
        Err(resp) => return resp,
    };
    let router = state.sources.router_usage.read().await;
    let provider = state.sources.provider_usage.read().await;
    let now = Utc::now();

    let data = if router.data.is_none() && provider.data.is_none() {
        None
    } else {
        let router_days = filter_usage_days(router.data.as_deref().unwrap_or_default(), window, now);
        let provider_days = filter_usage_days(provider.data.as_deref().unwrap_or_default(), window, now);
        Some(UsageView {
            summary: aggregate_usage_with_adjustment(&router_days, &provider_days, state.usage_adjustment_usd),
            router_days,
            provider_days,
        })
    };

    let errors: Vec<String> = [("router", &router.error), ("provider", &provider.error)]
        .into_iter()
        .filter_map(|(source, err)| err.as_ref().map(|e| format!("{source}: {e}")))
        .collect();
    let error = (!errors.is_empty()).then(|| errors.join("; "));

    respond(data, router.updated_at.max(provider.updated_at), error, Some(window))
}

/// GET /api/thoughts
async fn thoughts(State(state): State<AppState>) -> Response {
    let snapshot = state.sources.thoughts.read().await;
    respond_snapshot(&snapshot, None, |doc| ThoughtsBody {
        thoughts: latest_thoughts(doc, DEFAULT_THOUGHT_LIMIT),
        last_updated: doc.last_updated.clone(),
    })
}

/// POST /api/refresh
///
/// Wakes every poller; results arrive asynchronously.
async fn refresh(State(state): State<AppState>) -> impl IntoResponse {
    state.refresh.notify_waiters();
    (StatusCode::ACCEPTED, Json(json!({ "status": "refreshing" })))
}
