use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::deal::{DealContext, DealId};

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub String);

impl SessionId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
}

impl MessageRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterviewMessage {
    pub role: MessageRole,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl InterviewMessage {
    pub fn user(content: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self { role: MessageRole::User, content: content.into(), timestamp }
    }

    pub fn assistant(content: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self { role: MessageRole::Assistant, content: content.into(), timestamp }
    }
}

/// One interview between the service and a rep about a single deal.
///
/// The message log is append-only and `completed` only moves from false to true;
/// the type exposes no other mutation so both hold for every copy a caller owns.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InterviewSession {
    id: SessionId,
    deal_id: DealId,
    deal_context: DealContext,
    messages: Vec<InterviewMessage>,
    created_at: DateTime<Utc>,
    completed: bool,
}

impl InterviewSession {
    pub fn new(
        id: SessionId,
        deal_id: DealId,
        deal_context: DealContext,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self { id, deal_id, deal_context, messages: Vec::new(), created_at, completed: false }
    }

    pub fn id(&self) -> &SessionId {
        &self.id
    }

    pub fn deal_id(&self) -> &DealId {
        &self.deal_id
    }

    pub fn deal_context(&self) -> &DealContext {
        &self.deal_context
    }

    pub fn messages(&self) -> &[InterviewMessage] {
        &self.messages
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn is_completed(&self) -> bool {
        self.completed
    }

    pub fn append(&mut self, message: InterviewMessage) {
        self.messages.push(message);
    }

    pub fn mark_completed(&mut self) {
        self.completed = true;
    }

    /// Saturates at the latest representable instant.
    pub fn expires_at(&self, ttl: Duration) -> DateTime<Utc> {
        self.created_at.checked_add_signed(ttl).unwrap_or(DateTime::<Utc>::MAX_UTC)
    }

    pub fn is_expired(&self, ttl: Duration, now: DateTime<Utc>) -> bool {
        now >= self.expires_at(ttl)
    }

    /// Time left before expiry, or `None` once the session is past its TTL.
    pub fn remaining_ttl(&self, ttl: Duration, now: DateTime<Utc>) -> Option<Duration> {
        let remaining = self.expires_at(ttl) - now;
        (remaining > Duration::zero()).then_some(remaining)
    }
}
