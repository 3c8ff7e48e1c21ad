use chrono::{DateTime, Utc};
use course_core::model::{ModuleId, RevisionRequirement, TestId, UserId};
use sqlx::{Sqlite, Transaction};

use super::SqliteRepository;
use super::mapping::{conn, flag_to_i64, map_requirement_row};
use crate::repository::{RevisionRequirementRepository, StorageError};

const SELECT_COLUMNS: &str = r"
    SELECT
        id, user_id, module_id, test_id, failed_score, required_passing_score,
        revision_completed, revision_completed_at, created_at
    FROM revision_requirements
";

pub(super) async fn upsert_requirement_in(
    tx: &mut Transaction<'_, Sqlite>,
    user_id: &UserId,
    req: &RevisionRequirement,
) -> Result<(), StorageError> {
    sqlx::query(
        r"
            INSERT INTO revision_requirements (
                id, user_id, module_id, test_id, failed_score, required_passing_score,
                revision_completed, revision_completed_at, created_at
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            ON CONFLICT(user_id, module_id, test_id) DO UPDATE SET
                id = excluded.id,
                failed_score = excluded.failed_score,
                required_passing_score = excluded.required_passing_score,
                revision_completed = excluded.revision_completed,
                revision_completed_at = excluded.revision_completed_at,
                created_at = excluded.created_at
        ",
    )
    .bind(req.id.to_string())
    .bind(user_id.as_str())
    .bind(req.module_id.as_str())
    .bind(req.test_id.as_str())
    .bind(req.failed_score)
    .bind(i64::from(req.required_passing_score))
    .bind(flag_to_i64(req.revision_completed))
    .bind(req.revision_completed_at)
    .bind(req.created_at)
    .execute(&mut **tx)
    .await
    .map_err(conn)?;

    Ok(())
}

#[async_trait::async_trait]
impl RevisionRequirementRepository for SqliteRepository {
    async fn upsert_requirement(
        &self,
        user_id: &UserId,
        requirement: &RevisionRequirement,
    ) -> Result<(), StorageError> {
        let mut tx = self.pool.begin().await.map_err(conn)?;
        upsert_requirement_in(&mut tx, user_id, requirement).await?;
        tx.commit().await.map_err(conn)?;
        Ok(())
    }

    async fn requirements_for_user(
        &self,
        user_id: &UserId,
    ) -> Result<Vec<RevisionRequirement>, StorageError> {
        let sql = format!("{SELECT_COLUMNS} WHERE user_id = ?1 ORDER BY created_at ASC");
        let rows = sqlx::query(&sql)
            .bind(user_id.as_str())
            .fetch_all(&self.pool)
            .await
            .map_err(conn)?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            out.push(map_requirement_row(&row)?);
        }
        Ok(out)
    }

    async fn complete_requirement(
        &self,
        user_id: &UserId,
        module_id: &ModuleId,
        test_id: &TestId,
        completed_at: DateTime<Utc>,
    ) -> Result<Option<RevisionRequirement>, StorageError> {
        let mut tx = self.pool.begin().await.map_err(conn)?;

        let updated = sqlx::query(
            r"
                UPDATE revision_requirements
                SET revision_completed = 1, revision_completed_at = ?4
                WHERE user_id = ?1 AND module_id = ?2 AND test_id = ?3
                  AND revision_completed = 0
            ",
        )
        .bind(user_id.as_str())
        .bind(module_id.as_str())
        .bind(test_id.as_str())
        .bind(completed_at)
        .execute(&mut *tx)
        .await
        .map_err(conn)?;

        if updated.rows_affected() == 0 {
            tx.rollback().await.map_err(conn)?;
            return Ok(None);
        }

        let sql = format!("{SELECT_COLUMNS} WHERE user_id = ?1 AND module_id = ?2 AND test_id = ?3");
        let row = sqlx::query(&sql)
            .bind(user_id.as_str())
            .bind(module_id.as_str())
            .bind(test_id.as_str())
            .fetch_one(&mut *tx)
            .await
            .map_err(conn)?;
        let requirement = map_requirement_row(&row)?;

        tx.commit().await.map_err(conn)?;
        Ok(Some(requirement))
    }
}
