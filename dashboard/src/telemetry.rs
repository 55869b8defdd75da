use chrono::{Duration as ChronoDuration, NaiveDate};
use std::time::Duration;
use tracing::debug;

use crate::analytics::usage::{ProviderUsageResponse, RouterUsageResponse};
use crate::analytics::window::month_bounds;
use crate::error::{read_json, FetchError};
use crate::types::ThoughtsDocument;

/// Reads model usage and agent thoughts through the proxy, which holds the
/// upstream credentials.
#[derive(Clone)]
pub struct TelemetryClient {
    http: reqwest::Client,
    base_url: String,
}

impl TelemetryClient {
    pub fn new(base_url: &str) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn is_configured(&self) -> bool {
        !self.base_url.is_empty()
    }

    fn url(&self, path: &str) -> Result<String, FetchError> {
        if !self.is_configured() {
            return Err(FetchError::NotConfigured("PROXY_BASE_URL"));
        }
        Ok(format!("{}{}", self.base_url, path))
    }

    pub async fn router_usage(&self) -> Result<RouterUsageResponse, FetchError> {
        let resp = self.http.get(self.url("/api/openrouter-usage")?).send().await?;
        read_json(resp).await
    }

    /// Daily provider usage for `[starting_on, ending_before)`.
    pub async fn provider_usage(
        &self,
        starting_on: NaiveDate,
        ending_before: NaiveDate,
    ) -> Result<ProviderUsageResponse, FetchError> {
        let resp = self
            .http
            .get(self.url("/api/anthropic-usage")?)
            .query(&[
                ("starting_on", starting_on.format("%Y-%m-%d").to_string()),
                ("ending_before", ending_before.format("%Y-%m-%d").to_string()),
            ])
            .send()
            .await?;
        read_json(resp).await
    }

    /// `None` when the store has no thoughts yet.
    pub async fn thoughts(&self) -> Result<Option<ThoughtsDocument>, FetchError> {
        let resp = self.http.get(self.url("/api/thoughts")?).send().await?;
        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            debug!("Thoughts store is empty");
            return Ok(None);
        }
        read_json(resp).await.map(Some)
    }
}

/// Provider usage range wide enough for every dashboard window: from the
/// earlier of the month start and 30 days ago, through today.
pub fn provider_fetch_range(today: NaiveDate) -> (NaiveDate, NaiveDate) {
    let (month_start, _) = month_bounds(today);
    let start = month_start.min(today - ChronoDuration::days(30));
    (start, today + ChronoDuration::days(1))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[tokio::test]
    async fn test_provider_usage_sends_date_range() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/anthropic-usage"))
            .and(query_param("starting_on", "2025-07-01"))
            .and(query_param("ending_before", "2025-08-01"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "usages": { "2025-07-01": [{ "model_name": "claude-sonnet-4-20250514", "input": 10, "output": 5 }] },
                "granularity": "daily"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = TelemetryClient::new(&server.uri());
        let usage = client.provider_usage(day(2025, 7, 1), day(2025, 8, 1)).await.unwrap();
        assert_eq!(usage.usages["2025-07-01"][0].input, 10);
    }

    #[tokio::test]
    async fn test_router_usage() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/openrouter-usage"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": [{ "date": "2025-07-01", "model_permaslug": "m", "usage": 1.25, "requests": 3, "prompt_tokens": 10, "completion_tokens": 2 }]
            })))
            .mount(&server)
            .await;

        let usage = TelemetryClient::new(&server.uri()).router_usage().await.unwrap();
        assert_eq!(usage.data.len(), 1);
        assert_eq!(usage.data[0].usage, 1.25);
    }

    #[tokio::test]
    async fn test_missing_thoughts_is_none() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/thoughts"))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({ "error": "No thoughts found" })))
            .mount(&server)
            .await;

        let thoughts = TelemetryClient::new(&server.uri()).thoughts().await.unwrap();
        assert!(thoughts.is_none());
    }

    #[tokio::test]
    async fn test_proxy_failure_is_status_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/thoughts"))
            .respond_with(ResponseTemplate::new(500).set_body_json(json!({ "error": "Failed to fetch thoughts" })))
            .mount(&server)
            .await;

        let err = TelemetryClient::new(&server.uri()).thoughts().await.unwrap_err();
        assert!(matches!(err, FetchError::Status { status: 500, .. }));
    }

    #[tokio::test]
    async fn test_unconfigured_client() {
        let err = TelemetryClient::new("").router_usage().await.unwrap_err();
        assert!(matches!(err, FetchError::NotConfigured(_)));
    }

    #[test]
    fn test_provider_fetch_range_covers_month_and_rolling_windows() {
        assert_eq!(provider_fetch_range(day(2025, 7, 20)), (day(2025, 6, 20), day(2025, 7, 21)));
        assert_eq!(provider_fetch_range(day(2025, 3, 31)), (day(2025, 3, 1), day(2025, 4, 1)));
    }
}
