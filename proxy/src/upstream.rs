//! Session-authenticated clients for the two model usage dashboards.
//! Neither has a public API, so requests mimic the browser console.

use std::time::Duration;

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use serde_json::Value;
use tracing::debug;

use crate::config::ProxyConfig;

const BROWSER_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:141.0) Gecko/20100101 Firefox/141.0";

fn http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(30))
        .build()
        .unwrap_or_else(|_| reqwest::Client::new())
}

/// Read a JSON body, failing with the upstream's status and a body excerpt.
async fn json_or_bail(resp: reqwest::Response, upstream: &str) -> Result<Value> {
    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        let excerpt: String = body.chars().take(300).collect();
        bail!("{upstream} API returned {status}: {excerpt}");
    }
    resp.json().await.with_context(|| format!("Parse {upstream} response"))
}

/// LLM provider console, authenticated with a browser session.
#[derive(Clone)]
pub struct AnthropicConsoleClient {
    http: reqwest::Client,
    base_url: String,
    org_id: Option<String>,
    session_key: Option<String>,
    device_id: Option<String>,
    anonymous_id: Option<String>,
}

impl AnthropicConsoleClient {
    pub fn new(config: &ProxyConfig) -> Self {
        Self {
            http: http_client(),
            base_url: config.anthropic_console_url.trim_end_matches('/').to_string(),
            org_id: config.anthropic_org_id.clone(),
            session_key: config.anthropic_session_key.clone(),
            device_id: config.anthropic_device_id.clone(),
            anonymous_id: config.anthropic_anonymous_id.clone(),
        }
    }

    /// Daily usage for `[starting_on, ending_before)`, passed through as-is.
    pub async fn usage_activities(&self, starting_on: NaiveDate, ending_before: NaiveDate) -> Result<Value> {
        let (Some(org_id), Some(session_key), Some(device_id), Some(anonymous_id)) = (
            self.org_id.as_deref(),
            self.session_key.as_deref(),
            self.device_id.as_deref(),
            self.anonymous_id.as_deref(),
        ) else {
            bail!("Missing required Anthropic environment variables");
        };

        let url = format!("{}/api/organizations/{}/usage_activities", self.base_url, org_id);
        debug!("Fetching provider usage {} .. {}", starting_on, ending_before);

        let resp = self
            .http
            .get(&url)
            .query(&[
                ("starting_on", starting_on.format("%Y-%m-%d").to_string()),
                ("ending_before", ending_before.format("%Y-%m-%d").to_string()),
                ("categories", "true".to_string()),
                ("granularity", "daily".to_string()),
            ])
            .header("User-Agent", BROWSER_USER_AGENT)
            .header("Accept", "*/*")
            .header("Content-Type", "application/json")
            .header("anthropic-client-platform", "web_console")
            .header("anthropic-client-version", "1")
            .header("anthropic-anonymous-id", anonymous_id)
            .header("anthropic-device-id", device_id)
            .header("Cookie", format!("sessionKey={session_key}"))
            .send()
            .await
            .context("Anthropic usage request")?;

        json_or_bail(resp, "Anthropic").await
    }
}

/// Model router's activity page backend, authenticated with its session cookie.
#[derive(Clone)]
pub struct OpenRouterClient {
    http: reqwest::Client,
    base_url: String,
    session_cookie: Option<String>,
}

impl OpenRouterClient {
    pub fn new(config: &ProxyConfig) -> Self {
        Self {
            http: http_client(),
            base_url: config.openrouter_url.trim_end_matches('/').to_string(),
            session_cookie: config.openrouter_cookie.clone(),
        }
    }

    pub async fn transaction_analytics(&self) -> Result<Value> {
        let Some(session) = self.session_cookie.as_deref() else {
            bail!("OPENROUTER_COOKIE environment variable is not set");
        };

        let resp = self
            .http
            .get(format!("{}/api/frontend/user/transaction-analytics", self.base_url))
            .header("Accept", "*/*")
            .header("Referer", format!("{}/activity", self.base_url))
            .header("Cookie", format!("__session={session}"))
            .send()
            .await
            .context("OpenRouter usage request")?;

        json_or_bail(resp, "OpenRouter").await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[tokio::test]
    async fn test_anthropic_usage_sends_session_headers() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/organizations/org-1/usage_activities"))
            .and(query_param("starting_on", "2025-07-01"))
            .and(query_param("ending_before", "2025-08-01"))
            .and(query_param("granularity", "daily"))
            .and(header("cookie", "sessionKey=sk-session"))
            .and(header("anthropic-device-id", "device-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "usages": {}, "granularity": "daily" })))
            .expect(1)
            .mount(&server)
            .await;

        let client = AnthropicConsoleClient::new(&ProxyConfig::for_tests(&server.uri()));
        let body = client.usage_activities(day(2025, 7, 1), day(2025, 8, 1)).await.unwrap();
        assert_eq!(body["granularity"], "daily");
    }

    #[tokio::test]
    async fn test_anthropic_missing_credentials() {
        let mut config = ProxyConfig::for_tests("http://127.0.0.1:9");
        config.anthropic_device_id = None;
        let err = AnthropicConsoleClient::new(&config)
            .usage_activities(day(2025, 7, 1), day(2025, 8, 1))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Missing required Anthropic"));
    }

    #[tokio::test]
    async fn test_openrouter_relays_with_cookie() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/frontend/user/transaction-analytics"))
            .and(header("cookie", "__session=or-session"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "data": [{ "usage": 0.5 }] })))
            .mount(&server)
            .await;

        let client = OpenRouterClient::new(&ProxyConfig::for_tests(&server.uri()));
        let body = client.transaction_analytics().await.unwrap();
        assert_eq!(body["data"][0]["usage"], 0.5);
    }

    #[tokio::test]
    async fn test_openrouter_upstream_error_carries_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(401).set_body_string("session expired"))
            .mount(&server)
            .await;

        let client = OpenRouterClient::new(&ProxyConfig::for_tests(&server.uri()));
        let err = client.transaction_analytics().await.unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("401"), "{msg}");
        assert!(msg.contains("session expired"));
    }
}
