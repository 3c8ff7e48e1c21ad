use course_core::model::UserId;

use super::SqliteRepository;
use super::mapping::{conn, flag_to_i64, map_attempt_row};
use crate::repository::{ExerciseAttemptRecord, ExerciseAttemptRepository, StorageError};

#[async_trait::async_trait]
impl ExerciseAttemptRepository for SqliteRepository {
    async fn append_attempt(&self, record: &ExerciseAttemptRecord) -> Result<i64, StorageError> {
        let res = sqlx::query(
            r"
                INSERT INTO exercise_attempts (
                    user_id, module_id, lesson_id, exercise_id, correct, attempted_at
                )
                VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            ",
        )
        .bind(record.user_id.as_str())
        .bind(record.module_id.as_str())
        .bind(record.lesson_id.as_str())
        .bind(record.exercise_id.as_str())
        .bind(flag_to_i64(record.correct))
        .bind(record.attempted_at)
        .execute(&self.pool)
        .await
        .map_err(conn)?;

        Ok(res.last_insert_rowid())
    }

    async fn attempts_for_user(
        &self,
        user_id: &UserId,
    ) -> Result<Vec<ExerciseAttemptRecord>, StorageError> {
        let rows = sqlx::query(
            r"
                SELECT id, user_id, module_id, lesson_id, exercise_id, correct, attempted_at
                FROM exercise_attempts
                WHERE user_id = ?1
                ORDER BY attempted_at ASC, id ASC
            ",
        )
        .bind(user_id.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(conn)?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            out.push(map_attempt_row(&row)?);
        }
        Ok(out)
    }
}
