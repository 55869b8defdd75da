use anyhow::{Context, Result};
use std::str::FromStr;

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub gmx_oracle_url: String,
    pub gmx_subsquid_url: String,
    pub wallet_address: Option<String>,
    pub history_page_size: usize,
    pub proxy_base_url: String,
    /// Only count router usage for this model slug (all models when unset).
    pub router_model_filter: Option<String>,
    /// Out-of-band spend added to the usage total (e.g. console invoices).
    pub usage_cost_adjustment_usd: f64,
    pub positions_poll_secs: u64,
    pub orders_poll_secs: u64,
    pub history_poll_secs: u64,
    pub router_usage_poll_secs: u64,
    pub provider_usage_poll_secs: u64,
    pub thoughts_poll_secs: u64,
    pub fetch_retries: u32,
}

impl Config {
    /// Load config from a specific .env file, or the default `.env` if None.
    pub fn from_env_file(path: Option<&str>) -> Result<Self> {
        let Some(p) = path else {
            return Self::from_env();
        };
        dotenvy::from_filename(p).with_context(|| format!("Failed to load config file {p}"))?;
        Self::build_from_env()
    }

    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::build_from_env()
    }

    fn build_from_env() -> Result<Self> {
        Ok(Self {
            port: env_parse("PORT", 3000)?,
            gmx_oracle_url: env("GMX_ORACLE_URL", "https://arbitrum-api.gmxinfra.io"),
            gmx_subsquid_url: env(
                "GMX_SUBSQUID_URL",
                "https://gmx.squids.live/gmx-synthetics-arbitrum:prod/api/graphql",
            ),
            wallet_address: env_opt("GMX_WALLET_ADDRESS"),
            history_page_size: env_parse("GMX_HISTORY_PAGE_SIZE", 100)?,
            proxy_base_url: env("PROXY_BASE_URL", "http://localhost:8080"),
            router_model_filter: env_opt("ROUTER_MODEL_FILTER"),
            usage_cost_adjustment_usd: env_parse("USAGE_COST_ADJUSTMENT_USD", 0.0)?,
            positions_poll_secs: env_parse("POSITIONS_POLL_SECS", 5)?,
            orders_poll_secs: env_parse("ORDERS_POLL_SECS", 15)?,
            history_poll_secs: env_parse("HISTORY_POLL_SECS", 60)?,
            router_usage_poll_secs: env_parse("ROUTER_USAGE_POLL_SECS", 60)?,
            provider_usage_poll_secs: env_parse("PROVIDER_USAGE_POLL_SECS", 300)?,
            thoughts_poll_secs: env_parse("THOUGHTS_POLL_SECS", 30)?,
            fetch_retries: env_parse("FETCH_RETRIES", 3)?,
        })
    }
}

fn env(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_opt(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn env_parse<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env_opt(key) {
        Some(val) => val
            .trim()
            .parse()
            .with_context(|| format!("Invalid value for {key}: {val}")),
        None => Ok(default),
    }
}
