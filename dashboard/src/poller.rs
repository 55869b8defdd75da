//! Periodic collection. Each source gets its own task and its own snapshot
//! slot; a fetch result only lands if no newer fetch has landed before it.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{Notify, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::error::FetchError;

const BASE_RETRY_DELAY_MS: u64 = 1_000;
const MAX_RETRY_DELAY_MS: u64 = 30_000;

/// What a reader sees of one source.
#[derive(Debug, Clone)]
pub struct SnapshotState<T> {
    pub data: Option<T>,
    /// Last failure, cleared by the next success.
    pub error: Option<String>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl<T> Default for SnapshotState<T> {
    fn default() -> Self {
        Self { data: None, error: None, updated_at: None }
    }
}

struct Slot<T> {
    state: SnapshotState<T>,
    published: u64,
}

/// Last-write-wins cell for one data source.
pub struct Snapshot<T> {
    slot: RwLock<Slot<T>>,
    tickets: AtomicU64,
}

impl<T: Clone> Snapshot<T> {
    pub fn new() -> Self {
        Self {
            slot: RwLock::new(Slot { state: SnapshotState::default(), published: 0 }),
            tickets: AtomicU64::new(0),
        }
    }

    /// Tickets increase monotonically; issue one right before each fetch.
    pub fn next_ticket(&self) -> u64 {
        self.tickets.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Store a fetch outcome unless a newer ticket was already published.
    /// Failures keep the last good data. Returns whether it was applied.
    pub async fn publish(&self, ticket: u64, result: Result<T, FetchError>) -> bool {
        let mut slot = self.slot.write().await;
        if ticket <= slot.published {
            debug!("Discarding stale result (ticket {} <= {})", ticket, slot.published);
            return false;
        }
        slot.published = ticket;
        match result {
            Ok(data) => {
                slot.state.data = Some(data);
                slot.state.error = None;
                slot.state.updated_at = Some(Utc::now());
            }
            Err(e) => slot.state.error = Some(e.to_string()),
        }
        true
    }

    pub async fn read(&self) -> SnapshotState<T> {
        self.slot.read().await.state.clone()
    }
}

impl<T: Clone> Default for Snapshot<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Delay before retry number `attempt` (0-based): 1s, 2s, 4s ... capped at 30s.
pub fn retry_delay(attempt: u32) -> Duration {
    let ms = BASE_RETRY_DELAY_MS.saturating_mul(1u64 << attempt.min(16));
    Duration::from_millis(ms.min(MAX_RETRY_DELAY_MS))
}

/// Run `fetch`, retrying up to `retries` more times on retryable errors.
pub async fn fetch_with_retry<T, F, Fut>(name: &str, retries: u32, fetch: &F) -> Result<T, FetchError>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, FetchError>>,
{
    let mut attempt = 0;
    loop {
        match fetch().await {
            Ok(value) => return Ok(value),
            Err(e) if attempt < retries && e.is_retryable() => {
                let delay = retry_delay(attempt);
                warn!("{name} fetch failed (attempt {}): {e}. Retrying in {:?}", attempt + 1, delay);
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => {
                warn!("{name} fetch failed: {e}");
                return Err(e);
            }
        }
    }
}

/// Poll one source forever. Every tick (or refresh request) spawns a fetch
/// so a slow upstream never delays the schedule; overlapping results are
/// resolved by the snapshot's tickets.
pub fn spawn_poller<T, F, Fut>(
    name: &'static str,
    every: Duration,
    retries: u32,
    slot: Arc<Snapshot<T>>,
    refresh: Arc<Notify>,
    fetch: F,
) -> JoinHandle<()>
where
    T: Clone + Send + Sync + 'static,
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T, FetchError>> + Send + 'static,
{
    let fetch = Arc::new(fetch);
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = refresh.notified() => debug!("{name}: refresh requested"),
            }

            let ticket = slot.next_ticket();
            let slot = slot.clone();
            let fetch = fetch.clone();
            tokio::spawn(async move {
                let result = fetch_with_retry(name, retries, fetch.as_ref()).await;
                slot.publish(ticket, result).await;
            });
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;

    #[tokio::test]
    async fn test_stale_ticket_is_discarded() {
        let snapshot: Snapshot<u32> = Snapshot::new();
        let older = snapshot.next_ticket();
        let newer = snapshot.next_ticket();

        assert!(snapshot.publish(newer, Ok(2)).await);
        assert!(!snapshot.publish(older, Ok(1)).await);
        assert_eq!(snapshot.read().await.data, Some(2));
    }

    #[tokio::test]
    async fn test_failure_keeps_last_good_data() {
        let snapshot: Snapshot<&'static str> = Snapshot::new();
        snapshot.publish(snapshot.next_ticket(), Ok("fresh")).await;
        snapshot
            .publish(snapshot.next_ticket(), Err(FetchError::Decode("boom".into())))
            .await;

        let state = snapshot.read().await;
        assert_eq!(state.data, Some("fresh"));
        assert_eq!(state.error.as_deref(), Some("unexpected response: boom"));
        assert!(state.updated_at.is_some());

        snapshot.publish(snapshot.next_ticket(), Ok("again")).await;
        assert!(snapshot.read().await.error.is_none());
    }

    #[test]
    fn test_retry_delay_backoff() {
        assert_eq!(retry_delay(0), Duration::from_millis(1_000));
        assert_eq!(retry_delay(1), Duration::from_millis(2_000));
        assert_eq!(retry_delay(4), Duration::from_millis(16_000));
        assert_eq!(retry_delay(5), Duration::from_millis(30_000));
        assert_eq!(retry_delay(40), Duration::from_millis(30_000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_fetch_retries_then_succeeds() {
        let calls = AtomicU32::new(0);
        let fetch = || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(FetchError::Decode("flaky".into()))
                } else {
                    Ok(n)
                }
            }
        };

        let result = fetch_with_retry("test", 3, &fetch).await;
        assert_eq!(result.unwrap(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fetch_gives_up_after_retries() {
        let calls = AtomicU32::new(0);
        let fetch = || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err::<(), _>(FetchError::Decode("down".into())) }
        };

        assert!(fetch_with_retry("test", 3, &fetch).await.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_not_configured_is_not_retried() {
        let calls = AtomicU32::new(0);
        let fetch = || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err::<(), _>(FetchError::NotConfigured("PROXY_BASE_URL")) }
        };

        assert!(fetch_with_retry("test", 3, &fetch).await.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_poller_publishes_and_refreshes() {
        let slot: Arc<Snapshot<u32>> = Arc::new(Snapshot::new());
        let refresh = Arc::new(Notify::new());
        let counter = Arc::new(AtomicU32::new(0));

        let c = counter.clone();
        let handle = spawn_poller("counter", Duration::from_secs(3600), 0, slot.clone(), refresh.clone(), move || {
            let n = c.fetch_add(1, Ordering::SeqCst) + 1;
            async move { Ok(n) }
        });

        // First tick fires immediately
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(slot.read().await.data, Some(1));

        refresh.notify_waiters();
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(slot.read().await.data, Some(2));

        handle.abort();
    }
}
