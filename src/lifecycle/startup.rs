//! Startup orchestration.
//!
//! # Design Decisions
//! - Subsystems initialize in order, not concurrently
//! - Listeners start last (traffic only when ready)

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;

use crate::config::{RateLimitStore, StoreBackend, StorefrontConfig};
use crate::http::AppState;
use crate::lifecycle::Shutdown;
use crate::security::{build_rate_limiter, spawn_sweeper, Clock, RateLimitError};
use crate::store::{KvCache, MemoryStore, SqliteStore};

#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error("rate limit store: {0}")]
    RateLimit(#[from] RateLimitError),
    #[error("cache: {0}")]
    Cache(#[from] redis::RedisError),
    #[error("database: {0}")]
    Database(#[from] sqlx::Error),
    #[error("database: url is not set")]
    MissingDatabaseUrl,
}

/// Connect stores and assemble application state from a validated config.
pub async fn build_state(
    config: StorefrontConfig,
    clock: Arc<dyn Clock>,
) -> Result<AppState, StartupError> {
    let limiter = build_rate_limiter(&config.rate_limit, clock.clone()).await?;

    let cache = match (config.cache.enabled, config.cache.redis_url.as_deref()) {
        (true, Some(url)) => {
            let cache = KvCache::connect(url, config.cache.ttl_secs).await?;
            tracing::info!(ttl_secs = config.cache.ttl_secs, "Response cache enabled");
            cache
        }
        _ => KvCache::disabled(),
    };

    let backend = config.database.backend;
    let state = match backend {
        StoreBackend::Memory => {
            AppState::new(config, clock, limiter, Arc::new(MemoryStore::new()), cache)
        }
        StoreBackend::Sqlite => {
            let url = config
                .database
                .url
                .clone()
                .ok_or(StartupError::MissingDatabaseUrl)?;
            let store = SqliteStore::connect(&url, config.database.max_connections).await?;
            AppState::new(config, clock, limiter, Arc::new(store), cache)
        }
    };
    tracing::info!(
        store = ?backend,
        rate_limit_backend = state.limiter.backend(),
        failure_policy = ?state.config.rate_limit.failure_policy,
        admin_email = %state.config.admin.email,
        "Application state ready"
    );
    Ok(state)
}

/// Start background maintenance. Sessions are swept periodically, and so is
/// the in-memory limiter; Redis expires its own keys.
pub fn spawn_background_tasks(state: &AppState, shutdown: &Shutdown) -> Vec<JoinHandle<()>> {
    let limiter = (state.config.rate_limit.store == RateLimitStore::InMemory)
        .then(|| state.limiter.clone());
    let interval = Duration::from_secs(state.config.rate_limit.sweep_interval_secs);
    vec![spawn_sweeper(
        limiter,
        state.sessions.clone(),
        interval,
        shutdown.subscribe(),
    )]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::security::ManualClock;

    #[tokio::test]
    async fn test_default_config_builds_in_memory_state() {
        let state = build_state(StorefrontConfig::default(), Arc::new(ManualClock::new(0)))
            .await
            .unwrap();
        assert_eq!(state.limiter.backend(), "in-memory");
        assert!(!state.cache.is_enabled());

        let shutdown = Shutdown::new();
        let tasks = spawn_background_tasks(&state, &shutdown);
        assert_eq!(tasks.len(), 1);
        shutdown.trigger();
        for task in tasks {
            task.await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_sqlite_backend_is_migrated_and_reachable() {
        let mut config = StorefrontConfig::default();
        config.database.backend = StoreBackend::Sqlite;
        config.database.url = Some("sqlite::memory:".into());

        let state = build_state(config, Arc::new(ManualClock::new(0))).await.unwrap();
        state.health.ping().await.unwrap();
        assert!(state.categories.list_categories().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_sqlite_backend_without_url_fails_fast() {
        let mut config = StorefrontConfig::default();
        config.database.backend = StoreBackend::Sqlite;

        let result = build_state(config, Arc::new(ManualClock::new(0))).await;
        assert!(matches!(result, Err(StartupError::MissingDatabaseUrl)));
    }
}
