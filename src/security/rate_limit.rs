//! Fixed-window rate limiting.
//!
//! Each key owns one counter and one reset time. The first hit in a window
//! (or the first hit after the window has passed) resets the counter to 1;
//! later hits increment it. A hit is allowed while `count <= limit`.
//!
//! Two backends implement [`RateLimiter`]: [`MemoryRateLimiter`] keeps the
//! counters in process, `RedisRateLimiter` keeps them in Redis with a TTL so
//! they survive restarts and are shared between instances.

use std::fmt::Debug;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::auth::SessionStore;
use crate::config::{RateLimitConfig, RateLimitStore, RatePolicy};
use crate::security::rate_limit_redis::RedisRateLimiter;

/// Source of wall-clock time in epoch milliseconds.
pub trait Clock: Send + Sync + Debug {
    fn now_ms(&self) -> u64;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64
    }
}

/// A clock that only moves when told to.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicU64,
}

impl ManualClock {
    pub fn new(start_ms: u64) -> Self {
        Self {
            now: AtomicU64::new(start_ms),
        }
    }

    pub fn advance(&self, ms: u64) {
        self.now.fetch_add(ms, Ordering::SeqCst);
    }

    pub fn set(&self, ms: u64) {
        self.now.store(ms, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> u64 {
        self.now.load(Ordering::SeqCst)
    }
}

/// Outcome of counting one request against a quota.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decision {
    pub allowed: bool,
    /// Hits counted in the current window, including this one.
    pub count: u64,
    pub limit: u64,
    pub remaining: u64,
    /// End of the current window, epoch milliseconds.
    pub reset_time_ms: u64,
}

impl Decision {
    pub fn from_count(count: u64, limit: u64, reset_time_ms: u64) -> Self {
        Self {
            allowed: count <= limit,
            count,
            limit,
            remaining: limit.saturating_sub(count),
            reset_time_ms,
        }
    }

    /// Seconds until the window resets, rounded up, never below 1.
    pub fn retry_after_secs(&self, now_ms: u64) -> u64 {
        self.reset_time_ms.saturating_sub(now_ms).div_ceil(1000).max(1)
    }
}

/// Rate limit errors. Only raised by external stores.
#[derive(Debug, thiserror::Error)]
pub enum RateLimitError {
    #[error("rate limit store error: {0}")]
    Store(#[from] redis::RedisError),
    #[error("rate limit store misconfigured: {0}")]
    Config(String),
}

/// A fixed-window counter store.
#[async_trait]
pub trait RateLimiter: Send + Sync {
    /// Count one hit for `key` and decide whether it is within `policy`.
    async fn check(&self, key: &str, policy: RatePolicy) -> Result<Decision, RateLimitError>;

    /// Current time as seen by this limiter.
    fn now_ms(&self) -> u64;

    /// Short backend name for logs and metrics.
    fn backend(&self) -> &'static str;

    /// Drop records whose window has passed. Returns how many were removed.
    fn sweep_expired(&self) -> usize {
        0
    }
}

#[derive(Debug, Clone, Copy)]
struct WindowRecord {
    count: u64,
    reset_time_ms: u64,
}

/// In-process counters.
///
/// Each check is a read-modify-write under the shard lock of the key, so
/// concurrent hits on one key never lose an increment.
///
/// At most `max_tracked_keys` keys are held. When the table is full and
/// nothing in it has expired, a new key is counted as the first hit of a
/// fresh window without being stored.
#[derive(Debug)]
pub struct MemoryRateLimiter {
    records: DashMap<String, WindowRecord>,
    clock: Arc<dyn Clock>,
    max_tracked_keys: usize,
    /// Lower bound on the reset time of every tracked record.
    earliest_reset_ms: AtomicU64,
}

impl MemoryRateLimiter {
    pub fn new(clock: Arc<dyn Clock>, max_tracked_keys: usize) -> Self {
        Self {
            records: DashMap::new(),
            clock,
            max_tracked_keys,
            earliest_reset_ms: AtomicU64::new(u64::MAX),
        }
    }

    /// Number of keys currently tracked.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    fn hit(&self, key: &str, policy: RatePolicy) -> Decision {
        let now = self.clock.now_ms();
        let fresh_reset = now + policy.window_ms;

        if !self.records.contains_key(key) && self.records.len() >= self.max_tracked_keys {
            if now > self.earliest_reset_ms.load(Ordering::Acquire) {
                let removed = self.sweep_expired();
                tracing::debug!(removed, tracked = self.records.len(), "Rate limit table full, swept");
            }
            if self.records.len() >= self.max_tracked_keys {
                tracing::debug!(tracked = self.records.len(), "Rate limit table full, key not tracked");
                return Decision::from_count(1, policy.limit, fresh_reset);
            }
        }

        let mut record = self
            .records
            .entry(key.to_string())
            .or_insert(WindowRecord {
                count: 0,
                reset_time_ms: fresh_reset,
            });

        if record.count == 0 || now > record.reset_time_ms {
            record.count = 1;
            record.reset_time_ms = fresh_reset;
        } else {
            record.count += 1;
        }
        self.earliest_reset_ms.fetch_min(record.reset_time_ms, Ordering::AcqRel);
        Decision::from_count(record.count, policy.limit, record.reset_time_ms)
    }
}

#[async_trait]
impl RateLimiter for MemoryRateLimiter {
    async fn check(&self, key: &str, policy: RatePolicy) -> Result<Decision, RateLimitError> {
        Ok(self.hit(key, policy))
    }

    fn now_ms(&self) -> u64 {
        self.clock.now_ms()
    }

    fn backend(&self) -> &'static str {
        "in-memory"
    }

    fn sweep_expired(&self) -> usize {
        let now = self.clock.now_ms();
        let before = self.records.len();
        self.earliest_reset_ms.store(u64::MAX, Ordering::Release);
        self.records.retain(|_, record| {
            let live = now <= record.reset_time_ms;
            if live {
                self.earliest_reset_ms.fetch_min(record.reset_time_ms, Ordering::AcqRel);
            }
            live
        });
        before.saturating_sub(self.records.len())
    }
}

/// Build the configured limiter. Connects to Redis for the external store.
pub async fn build_rate_limiter(
    config: &RateLimitConfig,
    clock: Arc<dyn Clock>,
) -> Result<Arc<dyn RateLimiter>, RateLimitError> {
    match config.store {
        RateLimitStore::InMemory => {
            tracing::info!(max_tracked_keys = config.max_tracked_keys, "Using in-memory rate limit store");
            Ok(Arc::new(MemoryRateLimiter::new(clock, config.max_tracked_keys)))
        }
        RateLimitStore::External => {
            let url = config
                .redis_url
                .as_deref()
                .ok_or_else(|| RateLimitError::Config("redis_url is not set".into()))?;
            let limiter = RedisRateLimiter::connect(url, clock).await?;
            tracing::info!("Using external rate limit store");
            Ok(Arc::new(limiter))
        }
    }
}

/// Periodically purge expired sessions, and expired rate limit records when
/// the limiter keeps them in process, until shutdown.
pub fn spawn_sweeper(
    limiter: Option<Arc<dyn RateLimiter>>,
    sessions: Arc<SessionStore>,
    interval: Duration,
    mut shutdown: broadcast::Receiver<()>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.tick().await;
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Some(limiter) = &limiter {
                        let removed = limiter.sweep_expired();
                        if removed > 0 {
                            tracing::debug!(removed, backend = limiter.backend(), "Swept expired rate limit records");
                        }
                    }
                    let removed = sessions.sweep_expired();
                    if removed > 0 {
                        tracing::debug!(removed, "Swept expired sessions");
                    }
                }
                _ = shutdown.recv() => {
                    tracing::debug!("Sweeper stopped");
                    break;
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const WINDOW: u64 = 60_000;

    fn limiter(clock: Arc<ManualClock>) -> MemoryRateLimiter {
        MemoryRateLimiter::new(clock, 1_000)
    }

    #[tokio::test]
    async fn test_nth_allowed_and_n_plus_one_rejected() {
        let clock = Arc::new(ManualClock::new(1_000));
        let limiter = limiter(clock.clone());
        let policy = RatePolicy::new(3, WINDOW);

        for expected_remaining in [2, 1] {
            let d = limiter.check("ip", policy).await.unwrap();
            assert!(d.allowed);
            assert_eq!(d.remaining, expected_remaining);
        }

        let third = limiter.check("ip", policy).await.unwrap();
        assert!(third.allowed);
        assert_eq!(third.remaining, 0);

        let fourth = limiter.check("ip", policy).await.unwrap();
        assert!(!fourth.allowed);
        assert_eq!(fourth.remaining, 0);
        assert_eq!(fourth.count, 4);
        assert_eq!(fourth.reset_time_ms, 1_000 + WINDOW);
    }

    #[tokio::test]
    async fn test_window_resets_after_expiry() {
        let clock = Arc::new(ManualClock::new(0));
        let limiter = limiter(clock.clone());
        let policy = RatePolicy::new(1, WINDOW);

        assert!(limiter.check("ip", policy).await.unwrap().allowed);
        assert!(!limiter.check("ip", policy).await.unwrap().allowed);

        // Still inside the window at the reset instant
        clock.set(WINDOW);
        assert!(!limiter.check("ip", policy).await.unwrap().allowed);

        clock.set(WINDOW + 1);
        let d = limiter.check("ip", policy).await.unwrap();
        assert!(d.allowed);
        assert_eq!(d.count, 1);
        assert_eq!(d.reset_time_ms, 2 * WINDOW + 1);
    }

    #[tokio::test]
    async fn test_keys_are_independent() {
        let clock = Arc::new(ManualClock::new(0));
        let limiter = limiter(clock);
        let policy = RatePolicy::new(1, WINDOW);

        assert!(limiter.check("a", policy).await.unwrap().allowed);
        assert!(limiter.check("b", policy).await.unwrap().allowed);
        assert!(!limiter.check("a", policy).await.unwrap().allowed);
    }

    #[tokio::test]
    async fn test_sweep_removes_only_expired() {
        let clock = Arc::new(ManualClock::new(0));
        let limiter = limiter(clock.clone());

        limiter.check("old", RatePolicy::new(5, 1_000)).await.unwrap();
        limiter.check("new", RatePolicy::new(5, 10_000)).await.unwrap();
        clock.set(5_000);

        assert_eq!(limiter.sweep_expired(), 1);
        assert_eq!(limiter.len(), 1);
    }

    #[tokio::test]
    async fn test_bound_triggers_sweep() {
        let clock = Arc::new(ManualClock::new(0));
        let limiter = MemoryRateLimiter::new(clock.clone(), 2);
        let policy = RatePolicy::new(5, 100);

        limiter.check("a", policy).await.unwrap();
        limiter.check("b", policy).await.unwrap();
        clock.set(1_000);
        limiter.check("c", policy).await.unwrap();

        // a and b expired and were swept when c pushed the table past the bound
        assert_eq!(limiter.len(), 1);
    }

    #[tokio::test]
    async fn test_bound_holds_with_live_keys() {
        let clock = Arc::new(ManualClock::new(0));
        let limiter = MemoryRateLimiter::new(clock.clone(), 10);
        let policy = RatePolicy::new(1, WINDOW);

        for i in 0..1_000 {
            let d = limiter.check(&format!("10.0.{}.{}", i / 256, i % 256), policy).await.unwrap();
            assert!(d.allowed);
            assert!(limiter.len() <= 10);
        }
        assert_eq!(limiter.len(), 10);

        // Tracked keys keep counting while the table is full
        assert!(!limiter.check("10.0.0.0", policy).await.unwrap().allowed);

        // Once the tracked windows pass, new keys are stored again
        clock.set(WINDOW + 1);
        limiter.check("fresh", policy).await.unwrap();
        assert_eq!(limiter.len(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_hits_are_not_lost() {
        let clock = Arc::new(ManualClock::new(0));
        let limiter = Arc::new(limiter(clock));
        let policy = RatePolicy::new(1_000, WINDOW);

        let mut handles = Vec::new();
        for _ in 0..8 {
            let limiter = limiter.clone();
            handles.push(tokio::spawn(async move {
                for _ in 0..50 {
                    limiter.check("shared", policy).await.unwrap();
                }
            }));
        }
        for h in handles {
            h.await.unwrap();
        }

        let d = limiter.check("shared", policy).await.unwrap();
        assert_eq!(d.count, 401);
    }

    #[test]
    fn test_retry_after_rounds_up() {
        let d = Decision::from_count(3, 2, 60_000);
        assert_eq!(d.retry_after_secs(0), 60);
        assert_eq!(d.retry_after_secs(500), 60);
        assert_eq!(d.retry_after_secs(59_999), 1);
        assert_eq!(d.retry_after_secs(70_000), 1);
    }

    #[tokio::test]
    async fn test_sweeper_stops_on_shutdown() {
        let limiter: Arc<dyn RateLimiter> =
            Arc::new(MemoryRateLimiter::new(Arc::new(SystemClock), 10));
        let sessions = Arc::new(SessionStore::new(Arc::new(SystemClock), 60));
        let (tx, rx) = broadcast::channel(1);
        let handle = spawn_sweeper(Some(limiter), sessions, Duration::from_millis(10), rx);

        tx.send(()).unwrap();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("sweeper did not stop")
            .unwrap();
    }

    #[tokio::test]
    async fn test_sweeper_purges_expired_sessions() {
        let clock = Arc::new(ManualClock::new(0));
        let sessions = Arc::new(SessionStore::new(clock.clone(), 1));
        sessions.issue(&crate::store::User {
            id: 1,
            name: "Ann".into(),
            email: "ann@example.com".into(),
            password_hash: String::new(),
            role: "user".into(),
            image: None,
            created_at: chrono::Utc::now(),
        });
        clock.advance(1_000);

        let (tx, rx) = broadcast::channel(1);
        let handle = spawn_sweeper(None, sessions.clone(), Duration::from_millis(10), rx);
        tokio::time::timeout(Duration::from_secs(1), async {
            while !sessions.is_empty() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("expired session was not swept");

        tx.send(()).unwrap();
        handle.await.unwrap();
    }
}
