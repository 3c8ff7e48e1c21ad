use chrono::{DateTime, Utc};
use course_core::model::{
    ExerciseId, LessonId, ModuleId, RevisionRequirement, RevisionRequirementId, TestId, UserId,
};
use sqlx::Row;
use sqlx::sqlite::SqliteRow;

use crate::repository::{
    ExerciseAttemptRecord, LessonProgressRecord, StorageError, TestResultRecord,
};

pub(crate) fn ser<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Serialization(e.to_string())
}

pub(crate) fn conn<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Connection(e.to_string())
}

fn flag_from_i64(field: &'static str, v: i64) -> Result<bool, StorageError> {
    match v {
        0 => Ok(false),
        1 => Ok(true),
        other => Err(StorageError::Serialization(format!(
            "invalid {field} flag: {other}"
        ))),
    }
}

pub(crate) fn flag_to_i64(v: bool) -> i64 {
    i64::from(v)
}

fn text(row: &SqliteRow, field: &'static str) -> Result<String, StorageError> {
    row.try_get::<String, _>(field).map_err(ser)
}

pub(crate) fn map_lesson_row(row: &SqliteRow) -> Result<LessonProgressRecord, StorageError> {
    Ok(LessonProgressRecord {
        user_id: UserId::new(text(row, "user_id")?),
        module_id: ModuleId::new(text(row, "module_id")?),
        lesson_id: LessonId::new(text(row, "lesson_id")?),
        completed: flag_from_i64("completed", row.try_get("completed").map_err(ser)?)?,
        completed_at: row.try_get("completed_at").map_err(ser)?,
    })
}

pub(crate) fn map_attempt_row(row: &SqliteRow) -> Result<ExerciseAttemptRecord, StorageError> {
    Ok(ExerciseAttemptRecord {
        id: Some(row.try_get("id").map_err(ser)?),
        user_id: UserId::new(text(row, "user_id")?),
        module_id: ModuleId::new(text(row, "module_id")?),
        lesson_id: LessonId::new(text(row, "lesson_id")?),
        exercise_id: ExerciseId::new(text(row, "exercise_id")?),
        correct: flag_from_i64("correct", row.try_get("correct").map_err(ser)?)?,
        attempted_at: row.try_get("attempted_at").map_err(ser)?,
    })
}

pub(crate) fn map_result_row(row: &SqliteRow) -> Result<TestResultRecord, StorageError> {
    Ok(TestResultRecord {
        id: Some(row.try_get("id").map_err(ser)?),
        user_id: UserId::new(text(row, "user_id")?),
        module_id: ModuleId::new(text(row, "module_id")?),
        test_id: TestId::new(text(row, "test_id")?),
        score: row.try_get("score").map_err(ser)?,
        passed: flag_from_i64("passed", row.try_get("passed").map_err(ser)?)?,
        completed_at: row.try_get("completed_at").map_err(ser)?,
    })
}

pub(crate) fn map_requirement_row(row: &SqliteRow) -> Result<RevisionRequirement, StorageError> {
    let id: RevisionRequirementId = text(row, "id")?.parse().map_err(ser)?;
    let required: i64 = row.try_get("required_passing_score").map_err(ser)?;
    let required_passing_score = u8::try_from(required).map_err(|_| {
        StorageError::Serialization(format!("invalid required_passing_score: {required}"))
    })?;
    let revision_completed_at: Option<DateTime<Utc>> =
        row.try_get("revision_completed_at").map_err(ser)?;

    Ok(RevisionRequirement {
        id,
        module_id: ModuleId::new(text(row, "module_id")?),
        test_id: TestId::new(text(row, "test_id")?),
        failed_score: row.try_get("failed_score").map_err(ser)?,
        required_passing_score,
        revision_completed: flag_from_i64(
            "revision_completed",
            row.try_get("revision_completed").map_err(ser)?,
        )?,
        revision_completed_at,
        created_at: row.try_get("created_at").map_err(ser)?,
    })
}
