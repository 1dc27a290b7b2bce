use chrono::Utc;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use tracing::error;

use crate::errors::AppError;
use crate::models::{Space, SpaceType, UpdateSpaceRequest};

const SPACE_COLUMNS: &str =
    "id, creator_id, lut_name, name, type, description, created_at, updated_at";

#[derive(Clone)]
pub struct SpaceRepository {
    pool: PgPool,
}

impl SpaceRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn find_by_creator(&self, creator_id: &str) -> Result<Vec<Space>, AppError> {
        let rows = sqlx::query(&format!(
            "SELECT {SPACE_COLUMNS} FROM spaces WHERE creator_id = $1 ORDER BY created_at DESC"
        ))
        .bind(creator_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            error!("Failed to fetch spaces created by {creator_id}: {e}");
            AppError::db_query("Failed to fetch created spaces", e)
        })?;
        rows.iter().map(space_from_row).collect()
    }

    pub async fn find_by_ids(&self, ids: &[String]) -> Result<Vec<Space>, AppError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let rows = sqlx::query(&format!(
            "SELECT {SPACE_COLUMNS} FROM spaces WHERE id = ANY($1) ORDER BY created_at DESC"
        ))
        .bind(ids)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            error!("Failed to fetch {} member spaces: {e}", ids.len());
            AppError::db_query("Failed to fetch member spaces", e)
        })?;
        rows.iter().map(space_from_row).collect()
    }

    pub async fn find_by_id(&self, id: &str) -> Result<Option<Space>, AppError> {
        let row = sqlx::query(&format!("SELECT {SPACE_COLUMNS} FROM spaces WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| {
                error!("Failed to find space {id}: {e}");
                AppError::db_query(format!("Failed to fetch space {id}"), e)
            })?;
        row.as_ref().map(space_from_row).transpose()
    }

    pub async fn find_by_lut_name(&self, lut_name: &str) -> Result<Option<Space>, AppError> {
        let row = sqlx::query(&format!("SELECT {SPACE_COLUMNS} FROM spaces WHERE lut_name = $1"))
            .bind(lut_name)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| {
                error!("Failed to find space by LUT {lut_name}: {e}");
                AppError::db_query(format!("Failed to fetch space for LUT {lut_name}"), e)
            })?;
        row.as_ref().map(space_from_row).transpose()
    }

    pub async fn save(&self, space: &Space) -> Result<Space, AppError> {
        sqlx::query(
            "INSERT INTO spaces (id, creator_id, lut_name, name, type, description, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
        )
        .bind(&space.id)
        .bind(&space.creator_id)
        .bind(&space.lut_name)
        .bind(&space.name)
        .bind(space.space_type.as_str())
        .bind(&space.description)
        .bind(space.created_at)
        .bind(space.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            error!("Failed to save space {}: {e}", space.id);
            AppError::db_query("Failed to create space", e)
        })?;
        Ok(space.clone())
    }

    /// Applies the present fields only; a present `null` description clears
    /// it. Returns `false` when no row matched.
    pub async fn update(&self, id: &str, changes: &UpdateSpaceRequest) -> Result<bool, AppError> {
        let result = sqlx::query(
            "UPDATE spaces
             SET name = COALESCE($2, name),
                 description = CASE WHEN $3 THEN $4 ELSE description END,
                 type = COALESCE($5, type),
                 updated_at = $6
             WHERE id = $1",
        )
        .bind(id)
        .bind(&changes.name)
        .bind(changes.description.is_some())
        .bind(changes.description.clone().flatten())
        .bind(changes.space_type.map(|t| t.as_str()))
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(|e| {
            error!("Failed to update space {id}: {e}");
            AppError::db_query("Failed to update space", e)
        })?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn delete(&self, id: &str) -> Result<bool, AppError> {
        let result = sqlx::query("DELETE FROM spaces WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                error!("Failed to delete space {id}: {e}");
                AppError::db_query("Failed to delete space", e)
            })?;
        Ok(result.rows_affected() > 0)
    }
}

fn space_from_row(row: &PgRow) -> Result<Space, AppError> {
    let type_str: String =
        row.try_get("type").map_err(|e| AppError::db_query("Failed to read type", e))?;
    let space_type = SpaceType::try_from(type_str).map_err(AppError::Unexpected)?;
    Ok(Space {
        id: row.try_get("id").map_err(|e| AppError::db_query("Failed to read id", e))?,
        creator_id: row
            .try_get("creator_id")
            .map_err(|e| AppError::db_query("Failed to read creator_id", e))?,
        lut_name: row
            .try_get("lut_name")
            .map_err(|e| AppError::db_query("Failed to read lut_name", e))?,
        name: row.try_get("name").map_err(|e| AppError::db_query("Failed to read name", e))?,
        space_type,
        description: row
            .try_get("description")
            .map_err(|e| AppError::db_query("Failed to read description", e))?,
        created_at: row
            .try_get("created_at")
            .map_err(|e| AppError::db_query("Failed to read created_at", e))?,
        updated_at: row
            .try_get("updated_at")
            .map_err(|e| AppError::db_query("Failed to read updated_at", e))?,
    })
}
