use chrono::{Duration, Utc};
use sqlx::{sqlite::SqliteRow, Row};

use debrief_core::domain::interview::{InterviewSession, SessionId};

use super::{SessionStore, StoreError};
use crate::DbPool;

pub struct SqlSessionStore {
    pool: DbPool,
    ttl: Duration,
}

impl SqlSessionStore {
    pub fn new(pool: DbPool, ttl: Duration) -> Self {
        Self { pool, ttl }
    }
}

#[async_trait::async_trait]
impl SessionStore for SqlSessionStore {
    async fn get(&self, id: &SessionId) -> Result<Option<InterviewSession>, StoreError> {
        let row = sqlx::query(
            "SELECT session_json
             FROM interview_session
             WHERE id = ? AND expires_at > ?",
        )
        .bind(&id.0)
        .bind(Utc::now().timestamp_millis())
        .fetch_optional(&self.pool)
        .await?;

        row.map(session_from_row).transpose()
    }

    async fn set(&self, id: &SessionId, session: &InterviewSession) -> Result<(), StoreError> {
        let session_json = serde_json::to_string(session)?;
        sqlx::query(
            "INSERT INTO interview_session (
                id,
                deal_id,
                session_json,
                completed,
                created_at,
                expires_at,
                updated_at
             ) VALUES (?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                deal_id = excluded.deal_id,
                session_json = excluded.session_json,
                completed = excluded.completed,
                updated_at = excluded.updated_at",
        )
        .bind(&id.0)
        .bind(&session.deal_id().0)
        .bind(session_json)
        .bind(i64::from(session.is_completed()))
        .bind(session.created_at().to_rfc3339())
        .bind(session.expires_at(self.ttl).timestamp_millis())
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn delete(&self, id: &SessionId) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM interview_session WHERE id = ?")
            .bind(&id.0)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn sweep_expired(&self) -> Result<usize, StoreError> {
        let result = sqlx::query("DELETE FROM interview_session WHERE expires_at <= ?")
            .bind(Utc::now().timestamp_millis())
            .execute(&self.pool)
            .await?;
        usize::try_from(result.rows_affected())
            .map_err(|_| StoreError::Decode("swept row count overflows usize".to_string()))
    }

    async fn health_check(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    fn backend(&self) -> &'static str {
        "sqlite"
    }
}

fn session_from_row(row: SqliteRow) -> Result<InterviewSession, StoreError> {
    let raw = row.try_get::<String, _>("session_json")?;
    serde_json::from_str(&raw)
        .map_err(|error| StoreError::Decode(format!("invalid session_json: {error}")))
}
