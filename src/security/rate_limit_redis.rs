//! Redis-backed fixed-window counters.
//!
//! `INCR` and `PTTL` run in one atomic pipeline. A counter without an expiry
//! (first hit of a window, or a key that lost its TTL) gets `PEXPIRE window`,
//! so Redis itself ends the window.

use std::sync::Arc;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;

use crate::config::RatePolicy;
use crate::security::rate_limit::{Clock, Decision, RateLimitError, RateLimiter};

pub struct RedisRateLimiter {
    conn: ConnectionManager,
    clock: Arc<dyn Clock>,
}

impl RedisRateLimiter {
    /// Open a managed connection. Fails if the server cannot be reached.
    pub async fn connect(url: &str, clock: Arc<dyn Clock>) -> Result<Self, RateLimitError> {
        let client = redis::Client::open(url)?;
        let conn = ConnectionManager::new(client).await?;
        Ok(Self { conn, clock })
    }
}

#[async_trait]
impl RateLimiter for RedisRateLimiter {
    async fn check(&self, key: &str, policy: RatePolicy) -> Result<Decision, RateLimitError> {
        let mut conn = self.conn.clone();

        let (count, pttl): (u64, i64) = redis::pipe()
            .atomic()
            .incr(key, 1u64)
            .pttl(key)
            .query_async(&mut conn)
            .await?;

        // PTTL is -1 when the key has no expiry
        let ttl_ms = if pttl < 0 {
            let _: () = conn.pexpire(key, policy.window_ms as i64).await?;
            policy.window_ms
        } else {
            pttl as u64
        };

        Ok(Decision::from_count(count, policy.limit, self.clock.now_ms() + ttl_ms))
    }

    fn now_ms(&self) -> u64 {
        self.clock.now_ms()
    }

    fn backend(&self) -> &'static str {
        "redis"
    }
}
