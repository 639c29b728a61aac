/// User table access
///
/// Reads are plain pool queries; writes that must commit together with an
/// audit entry take the caller's connection so they can join a transaction.
use crate::access::{AccountStatus, RoleLevel, UserRecord, UserScope};
use crate::error::{AccessError, AccessResult};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection, SqlitePool};
use std::collections::HashSet;

const USER_COLUMNS: &str = "id, name, email, role_level, province_id, diocese_id, \
     archdeaconry_id, deanery_id, parish_id, account_status, force_logout";

/// Fields for inserting a user
#[derive(Debug, Clone, Default)]
pub struct NewUser {
    pub name: String,
    pub email: Option<String>,
    pub role_level: Option<RoleLevel>,
    pub province_id: Option<i64>,
    pub diocese_id: Option<i64>,
    pub archdeaconry_id: Option<i64>,
    pub deanery_id: Option<i64>,
    pub parish_id: Option<i64>,
}

#[derive(Clone)]
pub struct UserStore {
    db: SqlitePool,
}

impl UserStore {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    pub async fn insert_user(&self, user: NewUser) -> AccessResult<i64> {
        let role = user.role_level.unwrap_or(RoleLevel::Member);

        let result = sqlx::query(
            r#"
            INSERT INTO users (name, email, role_level, province_id, diocese_id,
                               archdeaconry_id, deanery_id, parish_id)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&user.name)
        .bind(&user.email)
        .bind(role.as_str())
        .bind(user.province_id)
        .bind(user.diocese_id)
        .bind(user.archdeaconry_id)
        .bind(user.deanery_id)
        .bind(user.parish_id)
        .execute(&self.db)
        .await?;

        Ok(result.last_insert_rowid())
    }

    pub async fn find_user(&self, id: i64) -> AccessResult<Option<UserRecord>> {
        let sql = format!("SELECT {} FROM users WHERE id = ?", USER_COLUMNS);
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.db)
            .await?;

        row.map(|row| parse_user(&row)).transpose()
    }

    /// Load a user or fail with NotFound
    pub async fn get_user(&self, id: i64) -> AccessResult<UserRecord> {
        self.find_user(id)
            .await?
            .ok_or_else(|| AccessError::NotFound(format!("user {} not found", id)))
    }

    /// Ids of every user matching a bounded scope.
    ///
    /// `UserScope::All` is refused: callers keep the unbounded marker instead
    /// of enumerating the whole table.
    pub async fn list_ids(&self, scope: &UserScope) -> AccessResult<HashSet<i64>> {
        match scope {
            UserScope::Nothing => Ok(HashSet::new()),
            UserScope::All => Err(AccessError::Internal(
                "refusing to enumerate an unbounded scope".to_string(),
            )),
            UserScope::Field { level, anchor } => {
                let sql = format!("SELECT id FROM users WHERE {} = ?", level.id_column());
                let rows = sqlx::query(&sql).bind(anchor).fetch_all(&self.db).await?;
                Ok(rows.iter().map(|row| row.get::<i64, _>("id")).collect())
            }
        }
    }

    /// Page through users visible under a scope, ordered by id
    pub async fn list_users(
        &self,
        scope: &UserScope,
        limit: i64,
        after_id: Option<i64>,
    ) -> AccessResult<Vec<UserRecord>> {
        let after_id = after_id.unwrap_or(0);

        let rows = match scope {
            UserScope::Nothing => return Ok(Vec::new()),
            UserScope::All => {
                let sql = format!(
                    "SELECT {} FROM users WHERE id > ? ORDER BY id LIMIT ?",
                    USER_COLUMNS
                );
                sqlx::query(&sql)
                    .bind(after_id)
                    .bind(limit)
                    .fetch_all(&self.db)
                    .await?
            }
            UserScope::Field { level, anchor } => {
                let sql = format!(
                    "SELECT {} FROM users WHERE {} = ? AND id > ? ORDER BY id LIMIT ?",
                    USER_COLUMNS,
                    level.id_column()
                );
                sqlx::query(&sql)
                    .bind(anchor)
                    .bind(after_id)
                    .bind(limit)
                    .fetch_all(&self.db)
                    .await?
            }
        };

        rows.iter().map(parse_user).collect()
    }

    pub async fn clear_force_logout(&self, id: i64) -> AccessResult<()> {
        sqlx::query("UPDATE users SET force_logout = 0 WHERE id = ?")
            .bind(id)
            .execute(&self.db)
            .await?;
        Ok(())
    }
}

/// Change a user's role and flag their sessions for re-authentication.
///
/// The update only applies while the row still holds `previous`; a
/// concurrent change in between surfaces as a Conflict.
pub async fn update_role(
    conn: &mut SqliteConnection,
    id: i64,
    previous: RoleLevel,
    new_role: RoleLevel,
) -> AccessResult<()> {
    let result = sqlx::query(
        "UPDATE users SET role_level = ?, force_logout = 1 WHERE id = ? AND role_level = ?",
    )
    .bind(new_role.as_str())
    .bind(id)
    .bind(previous.as_str())
    .execute(&mut *conn)
    .await?;

    if result.rows_affected() == 0 {
        return Err(AccessError::Conflict(format!(
            "role of user {} changed concurrently (expected {})",
            id, previous
        )));
    }

    Ok(())
}

/// Set account status; `force_logout` only ever raises the flag
pub async fn update_status(
    conn: &mut SqliteConnection,
    id: i64,
    status: AccountStatus,
    force_logout: bool,
) -> AccessResult<()> {
    let result = sqlx::query(
        "UPDATE users SET account_status = ?, force_logout = MAX(force_logout, ?) WHERE id = ?",
    )
    .bind(status.as_str())
    .bind(force_logout)
    .bind(id)
    .execute(&mut *conn)
    .await?;

    if result.rows_affected() == 0 {
        return Err(AccessError::NotFound(format!("user {} not found", id)));
    }

    Ok(())
}

pub async fn delete_user(conn: &mut SqliteConnection, id: i64) -> AccessResult<()> {
    let result = sqlx::query("DELETE FROM users WHERE id = ?")
        .bind(id)
        .execute(&mut *conn)
        .await?;

    if result.rows_affected() == 0 {
        return Err(AccessError::NotFound(format!("user {} not found", id)));
    }

    Ok(())
}

fn parse_user(row: &SqliteRow) -> AccessResult<UserRecord> {
    let role_str: String = row.get("role_level");
    let status_str: String = row.get("account_status");

    Ok(UserRecord {
        id: row.get("id"),
        name: row.get("name"),
        email: row.get("email"),
        role_level: RoleLevel::from_str(&role_str)
            .map_err(|_| AccessError::Internal(format!("stored role is invalid: {}", role_str)))?,
        province_id: row.get("province_id"),
        diocese_id: row.get("diocese_id"),
        archdeaconry_id: row.get("archdeaconry_id"),
        deanery_id: row.get("deanery_id"),
        parish_id: row.get("parish_id"),
        account_status: AccountStatus::from_str(&status_str)?,
        force_logout: row.get("force_logout"),
    })
}
