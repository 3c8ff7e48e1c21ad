use course_core::model::UserId;

use super::SqliteRepository;
use super::mapping::{conn, flag_to_i64, map_lesson_row};
use crate::repository::{LessonProgressRecord, LessonProgressRepository, StorageError};

#[async_trait::async_trait]
impl LessonProgressRepository for SqliteRepository {
    async fn upsert_lesson_progress(
        &self,
        record: &LessonProgressRecord,
    ) -> Result<(), StorageError> {
        sqlx::query(
            r"
            INSERT INTO lesson_progress (user_id, module_id, lesson_id, completed, completed_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ON CONFLICT(user_id, module_id, lesson_id) DO UPDATE SET
                completed = excluded.completed,
                completed_at = excluded.completed_at
            ",
        )
        .bind(record.user_id.as_str())
        .bind(record.module_id.as_str())
        .bind(record.lesson_id.as_str())
        .bind(flag_to_i64(record.completed))
        .bind(record.completed_at)
        .execute(&self.pool)
        .await
        .map_err(conn)?;

        Ok(())
    }

    async fn lesson_progress_for_user(
        &self,
        user_id: &UserId,
    ) -> Result<Vec<LessonProgressRecord>, StorageError> {
        let rows = sqlx::query(
            r"
                SELECT user_id, module_id, lesson_id, completed, completed_at
                FROM lesson_progress
                WHERE user_id = ?1
                ORDER BY completed_at ASC
            ",
        )
        .bind(user_id.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(conn)?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            out.push(map_lesson_row(&row)?);
        }
        Ok(out)
    }
}
