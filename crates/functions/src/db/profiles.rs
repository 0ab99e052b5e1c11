//! Profile repository backed by the `users` table.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use insight_library_core::{AppUser, Email, Role, UserId};

use super::{NewProfile, ProfileStore, RepositoryError};

const PROFILE_COLUMNS: &str =
    "id, email, display_name, avatar_url, role, is_approved, created_at";

// =============================================================================
// Internal Row Types
// =============================================================================

#[derive(Debug, sqlx::FromRow)]
struct ProfileRow {
    id: UserId,
    email: String,
    display_name: Option<String>,
    avatar_url: Option<String>,
    role: String,
    is_approved: bool,
    created_at: DateTime<Utc>,
}

impl TryFrom<ProfileRow> for AppUser {
    type Error = RepositoryError;

    fn try_from(row: ProfileRow) -> Result<Self, Self::Error> {
        let email = Email::parse(&row.email).map_err(|e| {
            RepositoryError::DataCorruption(format!("invalid email in database: {e}"))
        })?;
        let role: Role = row.role.parse().map_err(|e| {
            RepositoryError::DataCorruption(format!("invalid role in database: {e}"))
        })?;

        Ok(Self {
            id: row.id,
            email,
            display_name: row.display_name,
            avatar_url: row.avatar_url,
            role,
            is_approved: row.is_approved,
            created_at: row.created_at,
        })
    }
}

// =============================================================================
// Repository
// =============================================================================

/// `PostgreSQL` implementation of [`ProfileStore`].
#[derive(Clone)]
pub struct PgProfileStore {
    pool: PgPool,
}

impl PgProfileStore {
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ProfileStore for PgProfileStore {
    async fn get(&self, id: UserId) -> Result<Option<AppUser>, RepositoryError> {
        let sql = format!("SELECT {PROFILE_COLUMNS} FROM users WHERE id = $1");
        let row = sqlx::query_as::<_, ProfileRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(TryInto::try_into).transpose()
    }

    async fn provision(&self, profile: &NewProfile) -> Result<AppUser, RepositoryError> {
        let sql = format!(
            r"
            INSERT INTO users (id, email, display_name, role, is_approved)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (id) DO UPDATE
               SET email = EXCLUDED.email,
                   display_name = EXCLUDED.display_name,
                   role = EXCLUDED.role,
                   is_approved = EXCLUDED.is_approved,
                   updated_at = NOW()
            RETURNING {PROFILE_COLUMNS}
            "
        );
        let row = sqlx::query_as::<_, ProfileRow>(&sql)
            .bind(profile.id)
            .bind(&profile.email)
            .bind(&profile.display_name)
            .bind(profile.role.as_str())
            .bind(profile.is_approved)
            .fetch_one(&self.pool)
            .await?;

        row.try_into()
    }

    async fn update_role(&self, id: UserId, role: Role) -> Result<AppUser, RepositoryError> {
        let sql = format!(
            "UPDATE users SET role = $2, updated_at = NOW() WHERE id = $1 RETURNING {PROFILE_COLUMNS}"
        );
        let row = sqlx::query_as::<_, ProfileRow>(&sql)
            .bind(id)
            .bind(role.as_str())
            .fetch_optional(&self.pool)
            .await?
            .ok_or(RepositoryError::NotFound)?;

        row.try_into()
    }

    async fn set_approved(&self, id: UserId, approved: bool) -> Result<AppUser, RepositoryError> {
        let sql = format!(
            "UPDATE users SET is_approved = $2, updated_at = NOW() WHERE id = $1 RETURNING {PROFILE_COLUMNS}"
        );
        let row = sqlx::query_as::<_, ProfileRow>(&sql)
            .bind(id)
            .bind(approved)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(RepositoryError::NotFound)?;

        row.try_into()
    }

    async fn update_display_name(
        &self,
        id: UserId,
        display_name: Option<&str>,
    ) -> Result<AppUser, RepositoryError> {
        let sql = format!(
            "UPDATE users SET display_name = $2, updated_at = NOW() WHERE id = $1 RETURNING {PROFILE_COLUMNS}"
        );
        let row = sqlx::query_as::<_, ProfileRow>(&sql)
            .bind(id)
            .bind(display_name)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(RepositoryError::NotFound)?;

        row.try_into()
    }

    async fn delete(&self, id: UserId) -> Result<(), RepositoryError> {
        sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn list(&self, pending_only: bool) -> Result<Vec<AppUser>, RepositoryError> {
        let sql = format!(
            r"
            SELECT {PROFILE_COLUMNS}
            FROM users
            WHERE ($1 = FALSE OR is_approved = FALSE)
            ORDER BY created_at DESC
            "
        );
        let rows = sqlx::query_as::<_, ProfileRow>(&sql)
            .bind(pending_only)
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(TryInto::try_into).collect()
    }

    async fn ping(&self) -> Result<(), RepositoryError> {
        sqlx::query("SELECT 1").fetch_one(&self.pool).await?;
        Ok(())
    }
}
