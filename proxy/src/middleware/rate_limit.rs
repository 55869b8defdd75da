use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{ConnectInfo, Request, State};
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde_json::json;
use tracing::warn;

use crate::AppState;

/// Fixed one-minute request windows per client IP.
#[derive(Clone)]
pub struct RateLimiter {
    /// IP address -> (count, window_start)
    ip_minute: Arc<DashMap<String, (u32, DateTime<Utc>)>>,
    pub max_requests_per_ip_per_minute: u32,
    pub trust_forwarded_for: bool,
}

impl RateLimiter {
    pub fn new(max_requests_per_ip_per_minute: u32, trust_forwarded_for: bool) -> Self {
        Self {
            ip_minute: Arc::new(DashMap::new()),
            max_requests_per_ip_per_minute,
            trust_forwarded_for,
        }
    }

    /// Count a request from `ip`.
    /// Returns Ok(current_count) or Err(message) if over limit.
    pub fn check_ip_limit(&self, ip: &str) -> Result<u32, String> {
        let now = Utc::now();

        let mut entry = self
            .ip_minute
            .entry(ip.to_string())
            .or_insert((0, now));

        // Reset window if more than 60 seconds have passed
        if (now - entry.1).num_seconds() >= 60 {
            entry.0 = 0;
            entry.1 = now;
        }

        if entry.0 >= self.max_requests_per_ip_per_minute {
            return Err(format!(
                "IP has exceeded rate limit of {} requests/minute",
                self.max_requests_per_ip_per_minute
            ));
        }

        entry.0 += 1;
        Ok(entry.0)
    }

    /// Drop windows that ended more than a minute ago. Returns how many
    /// entries were removed.
    pub fn cleanup_stale_entries(&self) -> usize {
        let now = Utc::now();
        let before = self.ip_minute.len();
        self.ip_minute
            .retain(|_, (_, window_start)| (now - *window_start).num_seconds() < 120);
        before - self.ip_minute.len()
    }

    pub fn tracked_ips(&self) -> usize {
        self.ip_minute.len()
    }
}

/// The peer address. The first `X-Forwarded-For` hop is used instead only
/// when `trust_forwarded_for` is set, since clients can write that header.
fn client_ip(req: &Request, trust_forwarded_for: bool) -> String {
    let forwarded = req
        .headers()
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty());
    if let Some(forwarded) = forwarded.filter(|_| trust_forwarded_for) {
        return forwarded.to_string();
    }

    req.extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

/// Middleware answering 429 once an IP exceeds its per-minute budget.
pub async fn limit_by_ip(State(state): State<AppState>, req: Request, next: Next) -> Response {
    let ip = client_ip(&req, state.rate_limiter.trust_forwarded_for);
    if let Err(msg) = state.rate_limiter.check_ip_limit(&ip) {
        warn!("Rate limited {}: {}", ip, msg);
        return (StatusCode::TOO_MANY_REQUESTS, Json(json!({ "error": msg }))).into_response();
    }
    next.run(req).await
}
