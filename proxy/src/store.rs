use std::time::Duration;

use anyhow::{bail, Context, Result};
use chrono::Utc;
use serde_json::{json, Value};
use tracing::{debug, info};

use crate::config::ProxyConfig;

/// Rows fetched per request while scanning for thoughts, newest first.
const PAGE_SIZE: usize = 20;

/// Read access to the agent's memory table over Supabase REST, using the
/// service role key.
#[derive(Clone)]
pub struct ThoughtsStore {
    http: reqwest::Client,
    base_url: Option<String>,
    api_key: Option<String>,
    table: String,
}

impl ThoughtsStore {
    pub fn new(config: &ProxyConfig) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            http,
            base_url: config
                .supabase_url
                .as_deref()
                .map(|u| u.trim_end_matches('/').to_string()),
            api_key: config.supabase_service_key.clone(),
            table: config.thoughts_table.clone(),
        }
    }

    /// The most recent record holding at least one thought, shaped as
    /// `{ thoughts, lastUpdated }`. `None` when no record has any.
    pub async fn latest_thoughts(&self) -> Result<Option<Value>> {
        let (Some(base_url), Some(api_key)) = (self.base_url.as_deref(), self.api_key.as_deref()) else {
            bail!("SUPABASE_URL and SUPABASE_SERVICE_KEY must be set");
        };

        let url = format!("{}/rest/v1/{}", base_url, self.table);
        let mut offset = 0;

        // Page through the table until a row with thoughts turns up
        loop {
            let rows = self.fetch_page(&url, api_key, offset).await?;
            debug!("Scanned {} memory rows at offset {}", rows.len(), offset);

            let found = rows.iter().find_map(|row| {
                thoughts_of(row).map(|thoughts| {
                    json!({
                        "thoughts": thoughts,
                        "lastUpdated": last_updated_of(row),
                    })
                })
            });

            if let Some(doc) = found {
                info!(
                    "Serving {} thoughts",
                    doc["thoughts"].as_array().map(|a| a.len()).unwrap_or(0)
                );
                return Ok(Some(doc));
            }
            if rows.len() < PAGE_SIZE {
                return Ok(None);
            }
            offset += rows.len();
        }
    }

    async fn fetch_page(&self, url: &str, api_key: &str, offset: usize) -> Result<Vec<Value>> {
        let resp = self
            .http
            .get(url)
            .query(&[
                ("select", "*".to_string()),
                ("order", "updated_at.desc".to_string()),
                ("limit", PAGE_SIZE.to_string()),
                ("offset", offset.to_string()),
            ])
            .header("apikey", api_key)
            .header("Authorization", format!("Bearer {api_key}"))
            .send()
            .await
            .context("Supabase thoughts request")?;
        let status = resp.status();

        if !status.is_success() {
            let err_text = resp.text().await.unwrap_or_default();
            bail!("Supabase thoughts query failed ({}): {}", status, err_text);
        }

        resp.json().await.context("Parse thoughts rows")
    }
}

/// Thoughts are stored either at the top level or inside the `value` blob.
fn thoughts_of(row: &Value) -> Option<&Value> {
    [&row["thoughts"], &row["value"]["thoughts"]]
        .into_iter()
        .find(|t| t.as_array().is_some_and(|a| !a.is_empty()))
}

fn last_updated_of(row: &Value) -> Value {
    [&row["updated_at"], &row["updatedAt"], &row["value"]["updatedAt"]]
        .into_iter()
        .find(|v| v.is_string())
        .cloned()
        .unwrap_or_else(|| Value::String(Utc::now().to_rfc3339()))
}
