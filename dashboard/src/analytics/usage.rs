//! Model usage telemetry: ingestion of the two sources' payloads into
//! per-day records and the combined cost summary.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::pricing::token_cost;
use super::window::{month_bounds, DateWindow};
use crate::types::{UsageDayRecord, UsageSummary};

/// One usage bucket from the LLM provider's console API.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ProviderUsageItem {
    #[serde(default)]
    pub model_name: String,
    #[serde(default)]
    pub key_name: Option<String>,
    #[serde(default)]
    pub input: u64,
    #[serde(default)]
    pub output: u64,
}

/// `{ "usages": { "YYYY-MM-DD": [item, ...] } }`
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ProviderUsageResponse {
    #[serde(default)]
    pub usages: BTreeMap<String, Vec<ProviderUsageItem>>,
}

/// One row of the model router's transaction analytics.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RouterUsageItem {
    #[serde(default)]
    pub date: String,
    #[serde(default)]
    pub model_permaslug: String,
    /// Already in USD.
    #[serde(default)]
    pub usage: f64,
    #[serde(default)]
    pub requests: u64,
    #[serde(default)]
    pub prompt_tokens: u64,
    #[serde(default)]
    pub completion_tokens: u64,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RouterUsageResponse {
    #[serde(default)]
    pub data: Vec<RouterUsageItem>,
}

/// Summary plus the per-day records it was computed from.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct UsageView {
    pub summary: UsageSummary,
    pub router_days: Vec<UsageDayRecord>,
    pub provider_days: Vec<UsageDayRecord>,
}

/// Per-day records from the provider payload, oldest first.
/// Every item in a day's bucket counts as one request.
pub fn provider_days(response: &ProviderUsageResponse) -> Vec<UsageDayRecord> {
    response
        .usages
        .iter()
        .map(|(date, items)| {
            let mut day = UsageDayRecord {
                date: date.clone(),
                requests: items.len() as u64,
                ..Default::default()
            };
            for item in items {
                day.input_tokens += item.input;
                day.output_tokens += item.output;
                day.cost += token_cost(&item.model_name, item.input, item.output);
            }
            day
        })
        .collect()
}

/// Per-day records from the router payload, optionally restricted to one
/// model slug. Rows sharing a date are summed.
pub fn router_days(response: &RouterUsageResponse, model_filter: Option<&str>) -> Vec<UsageDayRecord> {
    let mut by_date: BTreeMap<String, UsageDayRecord> = BTreeMap::new();

    for item in &response.data {
        if model_filter.is_some_and(|slug| item.model_permaslug != slug) {
            continue;
        }
        let date = day_key(&item.date).to_string();
        let day = by_date.entry(date.clone()).or_insert_with(|| UsageDayRecord {
            date,
            ..Default::default()
        });
        day.cost += item.usage;
        day.requests += item.requests;
        day.input_tokens += item.prompt_tokens;
        day.output_tokens += item.completion_tokens;
    }

    by_date.into_values().collect()
}

/// The `YYYY-MM-DD` prefix of a date or datetime string.
fn day_key(date: &str) -> &str {
    date.get(..10).unwrap_or(date)
}

fn parse_day(date: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(day_key(date), "%Y-%m-%d").ok()
}

/// Restrict usage days to a window. `all` keeps the current calendar month;
/// rolling windows keep days on or after the cutoff's date. Unparseable
/// dates are dropped.
pub fn filter_usage_days(
    days: &[UsageDayRecord],
    window: DateWindow,
    now: DateTime<Utc>,
) -> Vec<UsageDayRecord> {
    let (start, end) = match window.days() {
        None => {
            let (start, end) = month_bounds(now.date_naive());
            (start, Some(end))
        }
        Some(n) => ((now - chrono::Duration::days(n)).date_naive(), None),
    };

    days.iter()
        .filter(|day| match parse_day(&day.date) {
            Some(d) => d >= start && end.map_or(true, |end| d < end),
            None => false,
        })
        .cloned()
        .collect()
}

pub fn aggregate_usage(router: &[UsageDayRecord], provider: &[UsageDayRecord]) -> UsageSummary {
    aggregate_usage_with_adjustment(router, provider, 0.0)
}

/// Combine both sources by plain addition; they are separate accounting
/// buckets. `adjustment_usd` is an out-of-band cost folded into the total
/// before averages are taken.
pub fn aggregate_usage_with_adjustment(
    router: &[UsageDayRecord],
    provider: &[UsageDayRecord],
    adjustment_usd: f64,
) -> UsageSummary {
    let mut summary = UsageSummary {
        adjustment_usd,
        ..Default::default()
    };

    for day in router.iter().chain(provider) {
        summary.total_cost += day.cost;
        summary.total_requests += day.requests;
        summary.total_input_tokens += day.input_tokens;
        summary.total_output_tokens += day.output_tokens;
    }
    summary.total_cost += adjustment_usd;
    summary.total_tokens = summary.total_input_tokens + summary.total_output_tokens;
    summary.days_observed = router.len().max(provider.len());
    summary.avg_daily_cost = summary.total_cost / summary.days_observed.max(1) as f64;
    summary.cost_per_million_tokens = if summary.total_tokens > 0 {
        summary.total_cost / summary.total_tokens as f64 * 1_000_000.0
    } else {
        0.0
    };

    summary
}
