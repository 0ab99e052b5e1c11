//! Notification repository backed by the `notifications` table.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use insight_library_core::{
    NewNotification, Notification, NotificationId, NotificationKind, UserId,
};

use super::{NotificationStore, RepositoryError};

const NOTIFICATION_COLUMNS: &str =
    "id, user_id, type, title, message, is_read, metadata, created_at, read_at";

#[derive(Debug, sqlx::FromRow)]
struct NotificationRow {
    id: NotificationId,
    user_id: UserId,
    #[sqlx(rename = "type")]
    kind: String,
    title: String,
    message: String,
    is_read: bool,
    metadata: serde_json::Value,
    created_at: DateTime<Utc>,
    read_at: Option<DateTime<Utc>>,
}

impl TryFrom<NotificationRow> for Notification {
    type Error = RepositoryError;

    fn try_from(row: NotificationRow) -> Result<Self, Self::Error> {
        let kind: NotificationKind = row.kind.parse().map_err(|e| {
            RepositoryError::DataCorruption(format!("invalid notification type in database: {e}"))
        })?;

        Ok(Self {
            id: row.id,
            user_id: row.user_id,
            kind,
            title: row.title,
            message: row.message,
            is_read: row.is_read,
            metadata: row.metadata,
            created_at: row.created_at,
            read_at: row.read_at,
        })
    }
}

/// `PostgreSQL` implementation of [`NotificationStore`].
#[derive(Clone)]
pub struct PgNotificationStore {
    pool: PgPool,
}

impl PgNotificationStore {
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl NotificationStore for PgNotificationStore {
    async fn create(&self, notification: &NewNotification) -> Result<Notification, RepositoryError> {
        let sql = format!(
            r"
            INSERT INTO notifications (user_id, type, title, message, metadata)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING {NOTIFICATION_COLUMNS}
            "
        );
        let row = sqlx::query_as::<_, NotificationRow>(&sql)
            .bind(notification.user_id)
            .bind(notification.kind.as_str())
            .bind(&notification.title)
            .bind(&notification.message)
            .bind(&notification.metadata)
            .fetch_one(&self.pool)
            .await?;

        row.try_into()
    }

    async fn list(&self, user_id: UserId, limit: u32) -> Result<Vec<Notification>, RepositoryError> {
        let sql = format!(
            r"
            SELECT {NOTIFICATION_COLUMNS}
            FROM notifications
            WHERE user_id = $1
            ORDER BY created_at DESC
            LIMIT $2
            "
        );
        let rows = sqlx::query_as::<_, NotificationRow>(&sql)
            .bind(user_id)
            .bind(i64::from(limit))
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(TryInto::try_into).collect()
    }

    async fn unread_count(&self, user_id: UserId) -> Result<u64, RepositoryError> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM notifications WHERE user_id = $1 AND is_read = FALSE",
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;

        u64::try_from(count)
            .map_err(|_| RepositoryError::DataCorruption(format!("negative count: {count}")))
    }

    async fn mark_read(&self, user_id: UserId, id: NotificationId) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            r"
            UPDATE notifications
            SET is_read = TRUE, read_at = COALESCE(read_at, NOW())
            WHERE id = $1 AND user_id = $2
            ",
        )
        .bind(id)
        .bind(user_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    async fn mark_all_read(&self, user_id: UserId) -> Result<u64, RepositoryError> {
        let result = sqlx::query(
            r"
            UPDATE notifications
            SET is_read = TRUE, read_at = NOW()
            WHERE user_id = $1 AND is_read = FALSE
            ",
        )
        .bind(user_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    async fn delete(&self, user_id: UserId, id: NotificationId) -> Result<(), RepositoryError> {
        let result = sqlx::query("DELETE FROM notifications WHERE id = $1 AND user_id = $2")
            .bind(id)
            .bind(user_id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }
}
