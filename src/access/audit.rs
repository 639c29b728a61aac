/// Append-only audit trail
use crate::error::{AccessError, AccessResult};
use crate::metrics;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteExecutor, SqlitePool};

/// Audit action names
pub mod actions {
    pub const ROLE_CHANGE: &str = "ROLE_CHANGE";
    pub const IMPERSONATE: &str = "IMPERSONATE";
    pub const ACCOUNT_ACTIVATE: &str = "ACCOUNT_ACTIVATE";
    pub const ACCOUNT_SUSPEND: &str = "ACCOUNT_SUSPEND";
    pub const ACCOUNT_DELETE: &str = "ACCOUNT_DELETE";
    pub const BULK_PREFIX: &str = "BULK_";

    /// Name of the entry recorded when `action` is refused
    pub fn denied(action: &str) -> String {
        format!("{}_DENIED", action)
    }
}

/// A stored audit entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: i64,
    pub actor_id: i64,
    pub action: String,
    pub target_id: Option<i64>,
    pub old_value: Option<String>,
    pub new_value: Option<String>,
    pub ip: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// An entry about to be appended
#[derive(Debug, Clone, Default)]
pub struct NewAuditEntry {
    pub actor_id: i64,
    pub action: String,
    pub target_id: Option<i64>,
    pub old_value: Option<String>,
    pub new_value: Option<String>,
    pub ip: Option<String>,
}

/// Append an entry through any SQLite executor, so it can join a transaction.
///
/// Not counted in metrics: a caller running inside a transaction calls
/// [`metrics::record_audit_entry`] once it has committed.
pub async fn append<'e, E>(executor: E, entry: &NewAuditEntry) -> AccessResult<i64>
where
    E: SqliteExecutor<'e>,
{
    let now = Utc::now();

    let result = sqlx::query(
        r#"
        INSERT INTO audit_log (actor_id, action, target_id, old_value, new_value, ip, timestamp)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(entry.actor_id)
    .bind(&entry.action)
    .bind(entry.target_id)
    .bind(&entry.old_value)
    .bind(&entry.new_value)
    .bind(&entry.ip)
    .bind(now.to_rfc3339())
    .execute(executor)
    .await?;

    Ok(result.last_insert_rowid())
}

/// Read side of the audit trail
#[derive(Clone)]
pub struct AuditLog {
    db: SqlitePool,
}

impl AuditLog {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    /// Append outside of any transaction
    pub async fn record(&self, entry: &NewAuditEntry) -> AccessResult<i64> {
        let id = append(&self.db, entry).await?;
        metrics::record_audit_entry(&entry.action);
        Ok(id)
    }

    /// Entries concerning one target, oldest first
    pub async fn list_for_target(&self, target_id: i64) -> AccessResult<Vec<AuditEntry>> {
        let rows = sqlx::query(
            r#"
            SELECT id, actor_id, action, target_id, old_value, new_value, ip, timestamp
            FROM audit_log
            WHERE target_id = ?
            ORDER BY id ASC
            "#,
        )
        .bind(target_id)
        .fetch_all(&self.db)
        .await?;

        rows.iter().map(parse_entry).collect()
    }

    /// Most recent entries, newest first
    pub async fn list_recent(&self, limit: i64) -> AccessResult<Vec<AuditEntry>> {
        let rows = sqlx::query(
            r#"
            SELECT id, actor_id, action, target_id, old_value, new_value, ip, timestamp
            FROM audit_log
            ORDER BY id DESC
            LIMIT ?
            "#,
        )
        .bind(limit)
        .fetch_all(&self.db)
        .await?;

        rows.iter().map(parse_entry).collect()
    }
}

fn parse_entry(row: &SqliteRow) -> AccessResult<AuditEntry> {
    let timestamp_str: String = row.get("timestamp");
    let timestamp = DateTime::parse_from_rfc3339(&timestamp_str)
        .map_err(|e| AccessError::Internal(format!("Invalid timestamp: {}", e)))?
        .with_timezone(&Utc);

    Ok(AuditEntry {
        id: row.get("id"),
        actor_id: row.get("actor_id"),
        action: row.get("action"),
        target_id: row.get("target_id"),
        old_value: row.get("old_value"),
        new_value: row.get("new_value"),
        ip: row.get("ip"),
        timestamp,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;

    #[test]
    fn test_denied_suffix() {
        assert_eq!(actions::denied(actions::ROLE_CHANGE), "ROLE_CHANGE_DENIED");
    }

    #[tokio::test]
    async fn test_record_and_list() {
        let pool = db::memory_pool().await.unwrap();
        let log = AuditLog::new(pool);

        log.record(&NewAuditEntry {
            actor_id: 1,
            action: actions::ROLE_CHANGE.to_string(),
            target_id: Some(2),
            old_value: Some("member".to_string()),
            new_value: Some("parish_admin".to_string()),
            ip: Some("10.0.0.4".to_string()),
        })
        .await
        .unwrap();
        log.record(&NewAuditEntry {
            actor_id: 1,
            action: actions::denied(actions::IMPERSONATE),
            target_id: Some(3),
            ..Default::default()
        })
        .await
        .unwrap();

        let entries = log.list_for_target(2).await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].old_value.as_deref(), Some("member"));
        assert_eq!(entries[0].ip.as_deref(), Some("10.0.0.4"));

        let recent = log.list_recent(10).await.unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].action, "IMPERSONATE_DENIED");
    }

    #[tokio::test]
    async fn test_rolled_back_entry_is_not_visible() {
        let pool = db::memory_pool().await.unwrap();
        let log = AuditLog::new(pool.clone());

        let mut tx = pool.begin().await.unwrap();
        append(
            &mut *tx,
            &NewAuditEntry {
                actor_id: 1,
                action: "ROLLED_BACK_CHANGE".to_string(),
                target_id: Some(5),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        tx.rollback().await.unwrap();

        assert!(log.list_for_target(5).await.unwrap().is_empty());
        // Nothing persisted, nothing counted
        assert_eq!(
            metrics::AUDIT_ENTRIES_TOTAL
                .with_label_values(&["ROLLED_BACK_CHANGE"])
                .get(),
            0
        );
    }

    #[tokio::test]
    async fn test_record_counts_persisted_entry() {
        let pool = db::memory_pool().await.unwrap();
        let log = AuditLog::new(pool);

        log.record(&NewAuditEntry {
            actor_id: 1,
            action: "COUNTED_CHANGE".to_string(),
            target_id: Some(5),
            ..Default::default()
        })
        .await
        .unwrap();

        assert_eq!(
            metrics::AUDIT_ENTRIES_TOTAL
                .with_label_values(&["COUNTED_CHANGE"])
                .get(),
            1
        );
    }
}
