//! Best-effort JSON cache over Redis.
//!
//! A disabled cache (no URL configured) turns every call into a no-op.
//! Backend errors are logged and reported as a miss; the cache never fails
//! a request.

use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};

#[derive(Clone)]
pub struct KvCache {
    conn: Option<ConnectionManager>,
    ttl_secs: u64,
}

impl std::fmt::Debug for KvCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KvCache")
            .field("enabled", &self.is_enabled())
            .field("ttl_secs", &self.ttl_secs)
            .finish()
    }
}

impl KvCache {
    pub fn disabled() -> Self {
        Self {
            conn: None,
            ttl_secs: 0,
        }
    }

    pub async fn connect(url: &str, ttl_secs: u64) -> Result<Self, redis::RedisError> {
        let client = redis::Client::open(url)?;
        let conn = ConnectionManager::new(client).await?;
        Ok(Self {
            conn: Some(conn),
            ttl_secs,
        })
    }

    pub fn is_enabled(&self) -> bool {
        self.conn.is_some()
    }

    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let mut conn = self.conn.clone()?;
        let raw: Option<String> = match conn.get(key).await {
            Ok(raw) => raw,
            Err(e) => {
                warn!(key = %key, error = %e, "Cache read failed");
                return None;
            }
        };
        let value = serde_json::from_str(&raw?)
            .map_err(|e| warn!(key = %key, error = %e, "Discarding undecodable cache entry"))
            .ok();
        if value.is_some() {
            debug!(key = %key, "Cache hit");
        }
        value
    }

    pub async fn set<T: Serialize>(&self, key: &str, value: &T) {
        let Some(mut conn) = self.conn.clone() else {
            return;
        };
        let raw = match serde_json::to_string(value) {
            Ok(raw) => raw,
            Err(e) => {
                warn!(key = %key, error = %e, "Cache value not serializable");
                return;
            }
        };
        if let Err(e) = conn.set_ex::<_, _, ()>(key, raw, self.ttl_secs).await {
            warn!(key = %key, error = %e, "Cache write failed");
        }
    }

    pub async fn delete(&self, key: &str) {
        let Some(mut conn) = self.conn.clone() else {
            return;
        };
        if let Err(e) = conn.del::<_, ()>(key).await {
            warn!(key = %key, error = %e, "Cache delete failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_disabled_cache_is_a_noop() {
        let cache = KvCache::disabled();
        cache.set("products:1", &serde_json::json!({"id": 1})).await;
        let hit: Option<serde_json::Value> = cache.get("products:1").await;
        assert!(hit.is_none());
        cache.delete("products:1").await;
        assert!(!cache.is_enabled());
    }
}
