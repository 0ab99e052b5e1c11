//! Activity audit log repository backed by the `activity_logs` table.
//!
//! Rows are only ever inserted and read; there is no update or delete path.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use insight_library_core::{
    ActivityAction, ActivityLog, ActivityLogId, ActivityLogQuery, NewActivityLog, Role, UserId,
};

use super::{ActivityLogStore, RepositoryError};

const LOG_COLUMNS: &str = "id, actor_id, actor_email, actor_role, action_type, \
                           target_user_id, target_user_email, details, created_at";

#[derive(Debug, sqlx::FromRow)]
struct ActivityLogRow {
    id: ActivityLogId,
    actor_id: UserId,
    actor_email: String,
    actor_role: String,
    action_type: String,
    target_user_id: Option<UserId>,
    target_user_email: Option<String>,
    details: serde_json::Value,
    created_at: DateTime<Utc>,
}

impl TryFrom<ActivityLogRow> for ActivityLog {
    type Error = RepositoryError;

    fn try_from(row: ActivityLogRow) -> Result<Self, Self::Error> {
        let actor_role: Role = row.actor_role.parse().map_err(|e| {
            RepositoryError::DataCorruption(format!("invalid actor role in database: {e}"))
        })?;
        let action_type: ActivityAction = row.action_type.parse().map_err(|e| {
            RepositoryError::DataCorruption(format!("invalid action type in database: {e}"))
        })?;

        Ok(Self {
            id: row.id,
            actor_id: row.actor_id,
            actor_email: row.actor_email,
            actor_role,
            action_type,
            target_user_id: row.target_user_id,
            target_user_email: row.target_user_email,
            details: row.details,
            created_at: row.created_at,
        })
    }
}

/// Escape `LIKE` metacharacters so user input matches literally.
fn escape_like(term: &str) -> String {
    let mut escaped = String::with_capacity(term.len());
    for c in term.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// `PostgreSQL` implementation of [`ActivityLogStore`].
#[derive(Clone)]
pub struct PgActivityLogStore {
    pool: PgPool,
}

impl PgActivityLogStore {
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ActivityLogStore for PgActivityLogStore {
    async fn append(&self, entry: &NewActivityLog) -> Result<ActivityLog, RepositoryError> {
        let sql = format!(
            r"
            INSERT INTO activity_logs
                (actor_id, actor_email, actor_role, action_type,
                 target_user_id, target_user_email, details)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING {LOG_COLUMNS}
            "
        );
        let row = sqlx::query_as::<_, ActivityLogRow>(&sql)
            .bind(entry.actor_id)
            .bind(&entry.actor_email)
            .bind(entry.actor_role.as_str())
            .bind(entry.action_type.as_str())
            .bind(entry.target_user_id)
            .bind(&entry.target_user_email)
            .bind(&entry.details)
            .fetch_one(&self.pool)
            .await?;

        row.try_into()
    }

    async fn list(&self, query: &ActivityLogQuery) -> Result<Vec<ActivityLog>, RepositoryError> {
        let sql = format!(
            r"
            SELECT {LOG_COLUMNS}
            FROM activity_logs
            WHERE ($1::text IS NULL OR action_type = $1)
              AND ($2::text IS NULL
                   OR lower(actor_email) LIKE $2
                   OR lower(COALESCE(target_user_email, '')) LIKE $2
                   OR action_type LIKE $2)
            ORDER BY created_at DESC
            LIMIT $3 OFFSET $4
            "
        );
        let pattern = query
            .search_term()
            .map(|term| format!("%{}%", escape_like(&term)));
        let offset = i64::try_from(query.offset()).unwrap_or(i64::MAX);

        let rows = sqlx::query_as::<_, ActivityLogRow>(&sql)
            .bind(query.action.map(ActivityAction::as_str))
            .bind(pattern)
            .bind(i64::from(query.limit()))
            .bind(offset)
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(TryInto::try_into).collect()
    }
}
