use anyhow::{Context, Result};

/// Upstream credentials are optional here: a missing one only fails the
/// endpoint that needs it, at request time.
#[derive(Debug, Clone)]
pub struct ProxyConfig {
    pub port: u16,
    pub anthropic_console_url: String,
    pub anthropic_org_id: Option<String>,
    pub anthropic_session_key: Option<String>,
    pub anthropic_device_id: Option<String>,
    pub anthropic_anonymous_id: Option<String>,
    pub openrouter_url: String,
    pub openrouter_cookie: Option<String>,
    pub supabase_url: Option<String>,
    pub supabase_service_key: Option<String>,
    pub thoughts_table: String,
    pub max_requests_per_ip_per_minute: u32,
    /// Key rate limits on `X-Forwarded-For` instead of the peer address.
    /// Only safe behind a reverse proxy that overwrites the header.
    pub trust_forwarded_for: bool,
    pub janitor_interval_secs: u64,
}

impl ProxyConfig {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            port: std::env::var("PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()
                .context("PORT must be a valid u16")?,
            anthropic_console_url: std::env::var("ANTHROPIC_CONSOLE_URL")
                .unwrap_or_else(|_| "https://console.anthropic.com".to_string()),
            anthropic_org_id: optional("ANTHROPIC_ORG_ID"),
            anthropic_session_key: optional("ANTHROPIC_SESSION_KEY"),
            anthropic_device_id: optional("ANTHROPIC_DEVICE_ID"),
            anthropic_anonymous_id: optional("ANTHROPIC_ANONYMOUS_ID"),
            openrouter_url: std::env::var("OPENROUTER_URL")
                .unwrap_or_else(|_| "https://openrouter.ai".to_string()),
            openrouter_cookie: optional("OPENROUTER_COOKIE"),
            supabase_url: optional("SUPABASE_URL"),
            supabase_service_key: optional("SUPABASE_SERVICE_KEY"),
            thoughts_table: std::env::var("THOUGHTS_TABLE")
                .unwrap_or_else(|_| "agent_memory".to_string()),
            max_requests_per_ip_per_minute: std::env::var("MAX_REQUESTS_PER_IP_PER_MINUTE")
                .unwrap_or_else(|_| "60".to_string())
                .parse()
                .context("MAX_REQUESTS_PER_IP_PER_MINUTE must be a valid u32")?,
            trust_forwarded_for: std::env::var("TRUST_FORWARDED_FOR")
                .unwrap_or_else(|_| "false".to_string())
                .parse()
                .context("TRUST_FORWARDED_FOR must be true or false")?,
            janitor_interval_secs: std::env::var("JANITOR_INTERVAL_SECS")
                .unwrap_or_else(|_| "300".to_string())
                .parse()
                .context("JANITOR_INTERVAL_SECS must be a valid u64")?,
        })
    }
}

#[cfg(test)]
impl ProxyConfig {
    /// Every upstream pointed at one mock server, all credentials present.
    pub fn for_tests(upstream: &str) -> Self {
        Self {
            port: 0,
            anthropic_console_url: upstream.to_string(),
            anthropic_org_id: Some("org-1".into()),
            anthropic_session_key: Some("sk-session".into()),
            anthropic_device_id: Some("device-1".into()),
            anthropic_anonymous_id: Some("anon-1".into()),
            openrouter_url: upstream.to_string(),
            openrouter_cookie: Some("or-session".into()),
            supabase_url: Some(upstream.to_string()),
            supabase_service_key: Some("service-key".into()),
            thoughts_table: "agent_memory".into(),
            max_requests_per_ip_per_minute: 60,
            trust_forwarded_for: false,
            janitor_interval_secs: 300,
        }
    }
}

fn optional(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}
