use std::collections::HashMap;

use chrono::{Duration, Utc};
use tokio::sync::RwLock;

use debrief_core::domain::interview::{InterviewSession, SessionId};

use super::{SessionStore, StoreError};

/// Process-local store. Expired entries are invisible to `get` immediately and
/// are physically removed by `sweep_expired`.
pub struct InMemorySessionStore {
    ttl: Duration,
    sessions: RwLock<HashMap<String, InterviewSession>>,
}

impl InMemorySessionStore {
    pub fn new(ttl: Duration) -> Self {
        Self { ttl, sessions: RwLock::new(HashMap::new()) }
    }

    /// Entries currently held, including any not yet swept.
    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }
}

#[async_trait::async_trait]
impl SessionStore for InMemorySessionStore {
    async fn get(&self, id: &SessionId) -> Result<Option<InterviewSession>, StoreError> {
        let sessions = self.sessions.read().await;
        let now = Utc::now();
        Ok(sessions.get(id.as_str()).filter(|session| !session.is_expired(self.ttl, now)).cloned())
    }

    async fn set(&self, id: &SessionId, session: &InterviewSession) -> Result<(), StoreError> {
        let mut sessions = self.sessions.write().await;
        sessions.insert(id.0.clone(), session.clone());
        Ok(())
    }

    async fn delete(&self, id: &SessionId) -> Result<(), StoreError> {
        let mut sessions = self.sessions.write().await;
        sessions.remove(id.as_str());
        Ok(())
    }

    async fn sweep_expired(&self) -> Result<usize, StoreError> {
        let mut sessions = self.sessions.write().await;
        let now = Utc::now();
        let before = sessions.len();
        sessions.retain(|_, session| !session.is_expired(self.ttl, now));
        Ok(before - sessions.len())
    }

    async fn health_check(&self) -> Result<(), StoreError> {
        Ok(())
    }

    fn backend(&self) -> &'static str {
        "memory"
    }
}
