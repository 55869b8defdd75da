use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use chrono::{Datelike, Months, NaiveDate, Utc};
use serde::Deserialize;
use serde_json::json;
use tracing::warn;

use crate::AppState;

#[derive(Deserialize)]
pub struct UsageRangeQuery {
    /// Inclusive start day, `YYYY-MM-DD`. Defaults to the first of this month.
    pub starting_on: Option<String>,
    /// Exclusive end day. Defaults to the first of next month.
    pub ending_before: Option<String>,
}

/// First day of `today`'s month and first day of the next one.
fn current_month(today: NaiveDate) -> (NaiveDate, NaiveDate) {
    let start = today.with_day(1).unwrap_or(today);
    let end = start.checked_add_months(Months::new(1)).unwrap_or(today);
    (start, end)
}

fn parse_day(raw: Option<&str>, default: NaiveDate) -> Result<NaiveDate, String> {
    match raw.map(str::trim).filter(|s| !s.is_empty()) {
        None => Ok(default),
        Some(s) => NaiveDate::parse_from_str(s, "%Y-%m-%d")
            .map_err(|_| format!("Invalid date '{s}', expected YYYY-MM-DD")),
    }
}

/// GET /api/anthropic-usage
///
/// Relays the console's daily usage for the requested range.
pub async fn anthropic_usage(
    State(state): State<AppState>,
    Query(params): Query<UsageRangeQuery>,
) -> impl IntoResponse {
    let (month_start, next_month) = current_month(Utc::now().date_naive());

    let range = parse_day(params.starting_on.as_deref(), month_start).and_then(|start| {
        parse_day(params.ending_before.as_deref(), next_month).map(|end| (start, end))
    });
    let (starting_on, ending_before) = match range {
        Ok(range) => range,
        Err(msg) => return (StatusCode::BAD_REQUEST, Json(json!({ "error": msg }))),
    };

    match state.anthropic.usage_activities(starting_on, ending_before).await {
        Ok(body) => (StatusCode::OK, Json(body)),
        Err(e) => {
            warn!("Failed to fetch Anthropic usage: {:#}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({
                    "error": "Failed to fetch Anthropic usage data",
                    "message": e.to_string(),
                })),
            )
        }
    }
}

/// GET /api/openrouter-usage
pub async fn openrouter_usage(State(state): State<AppState>) -> impl IntoResponse {
    match state.openrouter.transaction_analytics().await {
        Ok(body) => (StatusCode::OK, Json(body)),
        Err(e) => {
            warn!("Failed to fetch OpenRouter usage: {:#}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({
                    "error": "Failed to fetch OpenRouter usage data",
                    "message": e.to_string(),
                })),
            )
        }
    }
}
