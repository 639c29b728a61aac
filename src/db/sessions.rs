/// Session records backing the request actor.
///
/// Sessions are minted by the surrounding application after it has verified
/// credentials; this store only issues tokens and looks them up.
use crate::error::{AccessError, AccessResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub token: String,
    pub user_id: i64,
    pub csrf_token: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct SessionStore {
    db: SqlitePool,
}

impl SessionStore {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    /// Issue a session and its CSRF token for an authenticated user
    pub async fn create_session(&self, user_id: i64) -> AccessResult<Session> {
        let now = Utc::now();
        let session = Session {
            token: Uuid::new_v4().simple().to_string(),
            user_id,
            csrf_token: Uuid::new_v4().simple().to_string(),
            created_at: now,
        };

        sqlx::query(
            "INSERT INTO sessions (token, user_id, csrf_token, created_at) VALUES (?, ?, ?, ?)",
        )
        .bind(&session.token)
        .bind(session.user_id)
        .bind(&session.csrf_token)
        .bind(now.to_rfc3339())
        .execute(&self.db)
        .await?;

        Ok(session)
    }

    pub async fn get_session(&self, token: &str) -> AccessResult<Option<Session>> {
        let row = sqlx::query(
            "SELECT token, user_id, csrf_token, created_at FROM sessions WHERE token = ?",
        )
        .bind(token)
        .fetch_optional(&self.db)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let created_at_str: String = row.get("created_at");
        let created_at = DateTime::parse_from_rfc3339(&created_at_str)
            .map_err(|e| AccessError::Internal(format!("Invalid timestamp: {}", e)))?
            .with_timezone(&Utc);

        Ok(Some(Session {
            token: row.get("token"),
            user_id: row.get("user_id"),
            csrf_token: row.get("csrf_token"),
            created_at,
        }))
    }

    /// Drop every session of a user; returns how many were removed
    pub async fn revoke_user_sessions(&self, user_id: i64) -> AccessResult<u64> {
        let result = sqlx::query("DELETE FROM sessions WHERE user_id = ?")
            .bind(user_id)
            .execute(&self.db)
            .await?;

        Ok(result.rows_affected())
    }
}
