use std::time::Duration;

use tracing::{debug, info};

use crate::middleware::rate_limit::RateLimiter;

/// Periodically drops expired rate limiter windows so the per-IP map
/// does not grow with every client ever seen.
pub async fn run_janitor(rate_limiter: RateLimiter, interval_secs: u64) {
    let interval = Duration::from_secs(interval_secs.max(1));

    info!("Janitor started (interval: {}s)", interval_secs);

    loop {
        tokio::time::sleep(interval).await;

        let removed = rate_limiter.cleanup_stale_entries();
        debug!(
            "Janitor removed {} stale entries ({} IPs tracked)",
            removed,
            rate_limiter.tracked_ips()
        );
    }
}
