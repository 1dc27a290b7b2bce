use chrono::Utc;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use tracing::error;

use crate::errors::AppError;
use crate::models::{MemberRole, MemberStatus, SpaceMember};

const MEMBER_COLUMNS: &str =
    "id, space_id, user_id, email, role, status, invited_by, invited_at, accepted_at";

#[derive(Clone)]
pub struct MemberRepository {
    pool: PgPool,
}

impl MemberRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Inserts `member` unless `(space_id, email)` already exists.
    /// Returns `false` on such a duplicate.
    pub async fn save_if_absent(&self, member: &SpaceMember) -> Result<bool, AppError> {
        let result = sqlx::query(
            "INSERT INTO space_members
                 (id, space_id, user_id, email, role, status, invited_by, invited_at, accepted_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
             ON CONFLICT (space_id, email) DO NOTHING",
        )
        .bind(&member.id)
        .bind(&member.space_id)
        .bind(&member.user_id)
        .bind(&member.email)
        .bind(member.role.as_str())
        .bind(member.status.as_str())
        .bind(&member.invited_by)
        .bind(member.invited_at)
        .bind(member.accepted_at)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            error!("Failed to save member {} of space {}: {e}", member.email, member.space_id);
            AppError::db_query("Failed to invite user", e)
        })?;
        Ok(result.rows_affected() > 0)
    }

    /// Spaces where the user has accepted membership, matched by id or, when
    /// given, by email.
    pub async fn find_accepted_space_ids(
        &self,
        user_id: &str,
        email: Option<&str>,
    ) -> Result<Vec<String>, AppError> {
        let rows = sqlx::query(
            "SELECT DISTINCT space_id FROM space_members
             WHERE (user_id = $1 OR ($2::TEXT IS NOT NULL AND email = $2)) AND status = $3",
        )
        .bind(user_id)
        .bind(email)
        .bind(MemberStatus::Accepted.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            error!("Failed to fetch memberships of {user_id}: {e}");
            AppError::db_query("Failed to fetch member spaces", e)
        })?;
        rows.iter()
            .map(|row| {
                row.try_get("space_id")
                    .map_err(|e| AppError::db_query("Failed to read space_id", e))
            })
            .collect()
    }

    pub async fn find_by_space(&self, space_id: &str) -> Result<Vec<SpaceMember>, AppError> {
        let rows = sqlx::query(&format!(
            "SELECT {MEMBER_COLUMNS} FROM space_members
             WHERE space_id = $1 ORDER BY invited_at DESC"
        ))
        .bind(space_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            error!("Failed to fetch members of space {space_id}: {e}");
            AppError::db_query("Failed to fetch members", e)
        })?;
        rows.iter().map(member_from_row).collect()
    }

    pub async fn find_by_space_and_email(
        &self,
        space_id: &str,
        email: &str,
    ) -> Result<Option<SpaceMember>, AppError> {
        let row = sqlx::query(&format!(
            "SELECT {MEMBER_COLUMNS} FROM space_members WHERE space_id = $1 AND email = $2"
        ))
        .bind(space_id)
        .bind(email)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            error!("Failed to find member {email} of space {space_id}: {e}");
            AppError::db_query("Failed to fetch member", e)
        })?;
        row.as_ref().map(member_from_row).transpose()
    }

    pub async fn find_pending_by_email(
        &self,
        email: &str,
        limit: i64,
    ) -> Result<Vec<SpaceMember>, AppError> {
        let rows = sqlx::query(&format!(
            "SELECT {MEMBER_COLUMNS} FROM space_members
             WHERE email = $1 AND status = $2
             ORDER BY invited_at DESC
             LIMIT $3"
        ))
        .bind(email)
        .bind(MemberStatus::Pending.as_str())
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::db_query("Failed to fetch invitations", e))?;
        rows.iter().map(member_from_row).collect()
    }

    /// Flips a pending invitation to accepted. Returns the number of rows changed.
    pub async fn accept(&self, space_id: &str, user_id: &str, email: &str) -> Result<u64, AppError> {
        let result = sqlx::query(
            "UPDATE space_members
             SET status = $1, user_id = $2, accepted_at = $3
             WHERE space_id = $4 AND email = $5 AND status = $6",
        )
        .bind(MemberStatus::Accepted.as_str())
        .bind(user_id)
        .bind(Utc::now())
        .bind(space_id)
        .bind(email)
        .bind(MemberStatus::Pending.as_str())
        .execute(&self.pool)
        .await
        .map_err(|e| {
            error!("Failed to accept invitation of {email} to {space_id}: {e}");
            AppError::db_query("Failed to accept invitation", e)
        })?;
        Ok(result.rows_affected())
    }

    pub async fn delete(&self, member_id: &str) -> Result<bool, AppError> {
        let result = sqlx::query("DELETE FROM space_members WHERE id = $1")
            .bind(member_id)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                error!("Failed to remove member {member_id}: {e}");
                AppError::db_query("Failed to remove member", e)
            })?;
        Ok(result.rows_affected() > 0)
    }
}

fn member_from_row(row: &PgRow) -> Result<SpaceMember, AppError> {
    let role: String =
        row.try_get("role").map_err(|e| AppError::db_query("Failed to read role", e))?;
    let status: String =
        row.try_get("status").map_err(|e| AppError::db_query("Failed to read status", e))?;
    Ok(SpaceMember {
        id: row.try_get("id").map_err(|e| AppError::db_query("Failed to read id", e))?,
        space_id: row
            .try_get("space_id")
            .map_err(|e| AppError::db_query("Failed to read space_id", e))?,
        user_id: row
            .try_get("user_id")
            .map_err(|e| AppError::db_query("Failed to read user_id", e))?,
        email: row.try_get("email").map_err(|e| AppError::db_query("Failed to read email", e))?,
        role: MemberRole::try_from(role).map_err(AppError::Unexpected)?,
        status: MemberStatus::try_from(status).map_err(AppError::Unexpected)?,
        invited_by: row
            .try_get("invited_by")
            .map_err(|e| AppError::db_query("Failed to read invited_by", e))?,
        invited_at: row
            .try_get("invited_at")
            .map_err(|e| AppError::db_query("Failed to read invited_at", e))?,
        accepted_at: row
            .try_get("accepted_at")
            .map_err(|e| AppError::db_query("Failed to read accepted_at", e))?,
    })
}
