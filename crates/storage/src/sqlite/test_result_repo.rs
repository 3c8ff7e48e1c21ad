use course_core::model::{ModuleId, RevisionRequirement, TestId, UserId};
use sqlx::{Sqlite, Transaction};
use tracing::debug;

use super::SqliteRepository;
use super::mapping::{conn, flag_to_i64, map_result_row};
use super::revision_repo::upsert_requirement_in;
use crate::repository::{
    StorageError, TestAttemptPersistence, TestResultRecord, TestResultRepository,
};

async fn insert_result(
    tx: &mut Transaction<'_, Sqlite>,
    record: &TestResultRecord,
) -> Result<i64, StorageError> {
    let res = sqlx::query(
        r"
            INSERT INTO test_results (user_id, module_id, test_id, score, passed, completed_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
        ",
    )
    .bind(record.user_id.as_str())
    .bind(record.module_id.as_str())
    .bind(record.test_id.as_str())
    .bind(record.score)
    .bind(flag_to_i64(record.passed))
    .bind(record.completed_at)
    .execute(&mut **tx)
    .await
    .map_err(conn)?;

    Ok(res.last_insert_rowid())
}

#[async_trait::async_trait]
impl TestResultRepository for SqliteRepository {
    async fn append_result(&self, record: &TestResultRecord) -> Result<i64, StorageError> {
        let mut tx = self.pool.begin().await.map_err(conn)?;
        let id = insert_result(&mut tx, record).await?;
        tx.commit().await.map_err(conn)?;
        Ok(id)
    }

    async fn results_for_user(
        &self,
        user_id: &UserId,
    ) -> Result<Vec<TestResultRecord>, StorageError> {
        let rows = sqlx::query(
            r"
                SELECT id, user_id, module_id, test_id, score, passed, completed_at
                FROM test_results
                WHERE user_id = ?1
                ORDER BY completed_at ASC, id ASC
            ",
        )
        .bind(user_id.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(conn)?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            out.push(map_result_row(&row)?);
        }
        Ok(out)
    }

    async fn results_for_test(
        &self,
        user_id: &UserId,
        module_id: &ModuleId,
        test_id: &TestId,
    ) -> Result<Vec<TestResultRecord>, StorageError> {
        let rows = sqlx::query(
            r"
                SELECT id, user_id, module_id, test_id, score, passed, completed_at
                FROM test_results
                WHERE user_id = ?1 AND module_id = ?2 AND test_id = ?3
                ORDER BY completed_at DESC, id DESC
            ",
        )
        .bind(user_id.as_str())
        .bind(module_id.as_str())
        .bind(test_id.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(conn)?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            out.push(map_result_row(&row)?);
        }
        Ok(out)
    }
}

#[async_trait::async_trait]
impl TestAttemptPersistence for SqliteRepository {
    async fn record_test_attempt(
        &self,
        result: &TestResultRecord,
        requirement: Option<&RevisionRequirement>,
    ) -> Result<i64, StorageError> {
        if let Some(req) = requirement {
            if req.module_id != result.module_id || req.test_id != result.test_id {
                return Err(StorageError::Conflict);
            }
        }

        let mut tx = self.pool.begin().await.map_err(conn)?;
        let id = insert_result(&mut tx, result).await?;
        if let Some(req) = requirement {
            upsert_requirement_in(&mut tx, &result.user_id, req).await?;
        }
        tx.commit().await.map_err(conn)?;

        debug!(
            result_id = id,
            module = %result.module_id,
            test = %result.test_id,
            with_requirement = requirement.is_some(),
            "recorded test attempt"
        );
        Ok(id)
    }
}
