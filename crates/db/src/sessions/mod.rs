//! Bounded-lifetime interview session storage.
//!
//! Every backend measures expiry from the session's `created_at`; writes never
//! extend a session's lifetime. Stores are last-write-wins. Callers that need a
//! single writer per session serialize above this layer.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use async_trait::async_trait;
use chrono::Duration;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use debrief_core::config::{AppConfig, SessionBackend};
use debrief_core::domain::interview::{InterviewSession, SessionId};

pub mod memory;
pub mod redis;
pub mod sql;

pub use self::redis::RedisSessionStore;
pub use memory::InMemorySessionStore;
pub use sql::SqlSessionStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
    #[error("redis error: {0}")]
    Redis(#[from] ::redis::RedisError),
    #[error("session codec error: {0}")]
    Codec(#[from] serde_json::Error),
    #[error("decode error: {0}")]
    Decode(String),
}

#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Returns the session unless it is absent or past its TTL.
    async fn get(&self, id: &SessionId) -> Result<Option<InterviewSession>, StoreError>;
    async fn set(&self, id: &SessionId, session: &InterviewSession) -> Result<(), StoreError>;
    async fn delete(&self, id: &SessionId) -> Result<(), StoreError>;
    /// Drops expired sessions and reports how many were removed.
    async fn sweep_expired(&self) -> Result<usize, StoreError>;
    async fn health_check(&self) -> Result<(), StoreError>;
    fn backend(&self) -> &'static str;
}

pub(crate) fn ttl_from_secs(ttl_secs: u64) -> Duration {
    i64::try_from(ttl_secs).ok().and_then(Duration::try_seconds).unwrap_or(Duration::MAX)
}

/// Builds the backend named by `session.backend`. The sqlite backend runs
/// pending migrations before it is returned.
pub async fn open_session_store(config: &AppConfig) -> Result<Arc<dyn SessionStore>, StoreError> {
    let ttl = ttl_from_secs(config.session.ttl_secs);
    let store: Arc<dyn SessionStore> = match config.session.backend {
        SessionBackend::Memory => Arc::new(InMemorySessionStore::new(ttl)),
        SessionBackend::Redis => Arc::new(RedisSessionStore::connect(&config.redis.url, ttl).await?),
        SessionBackend::Sqlite => {
            let pool = crate::connect(&config.database).await?;
            crate::migrations::run_pending(&pool).await?;
            Arc::new(SqlSessionStore::new(pool, ttl))
        }
    };

    info!(
        event_name = "session_store.opened",
        backend = store.backend(),
        ttl_secs = config.session.ttl_secs,
        "session store ready"
    );
    Ok(store)
}

/// Runs `sweep_expired` on a fixed interval until the handle is aborted.
pub fn spawn_sweeper(store: Arc<dyn SessionStore>, every: StdDuration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            match store.sweep_expired().await {
                Ok(0) => {}
                Ok(removed) => info!(
                    event_name = "session_store.swept",
                    backend = store.backend(),
                    removed,
                    "expired sessions removed"
                ),
                Err(error) => warn!(
                    event_name = "session_store.sweep_failed",
                    backend = store.backend(),
                    error = %error,
                    "session sweep failed"
                ),
            }
        }
    })
}
