use async_trait::async_trait;
use chrono::{DateTime, Utc};
use course_core::model::{
    ExerciseId, LessonId, ModuleId, RevisionRequirement, TestId, TestResult, UserId,
};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use thiserror::Error;

/// Errors surfaced by storage adapters.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StorageError {
    #[error("not found")]
    NotFound,

    #[error("conflict")]
    Conflict,

    #[error("connection error: {0}")]
    Connection(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

//
// ─── RECORDS ───────────────────────────────────────────────────────────────────
//

/// Row of the lesson-progress collection, keyed by (user, module, lesson).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LessonProgressRecord {
    pub user_id: UserId,
    pub module_id: ModuleId,
    pub lesson_id: LessonId,
    pub completed: bool,
    pub completed_at: DateTime<Utc>,
}

/// Append-only exercise attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExerciseAttemptRecord {
    pub id: Option<i64>,
    pub user_id: UserId,
    pub module_id: ModuleId,
    pub lesson_id: LessonId,
    pub exercise_id: ExerciseId,
    pub correct: bool,
    pub attempted_at: DateTime<Utc>,
}

/// Append-only test attempt. The most recent row per test is the current result.
#[derive(Debug, Clone, PartialEq)]
pub struct TestResultRecord {
    pub id: Option<i64>,
    pub user_id: UserId,
    pub module_id: ModuleId,
    pub test_id: TestId,
    pub score: f64,
    pub passed: bool,
    pub completed_at: DateTime<Utc>,
}

impl TestResultRecord {
    #[must_use]
    pub fn new(
        user_id: UserId,
        module_id: ModuleId,
        test_id: TestId,
        score: f64,
        passed: bool,
        completed_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: None,
            user_id,
            module_id,
            test_id,
            score,
            passed,
            completed_at,
        }
    }

    #[must_use]
    pub fn to_result(&self) -> TestResult {
        TestResult {
            score: self.score,
            passed: self.passed,
            completed_at: self.completed_at,
        }
    }
}

//
// ─── REPOSITORY CONTRACTS ──────────────────────────────────────────────────────
//

#[async_trait]
pub trait LessonProgressRepository: Send + Sync {
    /// Insert or overwrite the row for (user, module, lesson).
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the row cannot be stored.
    async fn upsert_lesson_progress(&self, record: &LessonProgressRecord)
    -> Result<(), StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError` if the rows cannot be read.
    async fn lesson_progress_for_user(
        &self,
        user_id: &UserId,
    ) -> Result<Vec<LessonProgressRecord>, StorageError>;
}

#[async_trait]
pub trait ExerciseAttemptRepository: Send + Sync {
    /// Append an attempt and return its row id.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the attempt cannot be stored.
    async fn append_attempt(&self, record: &ExerciseAttemptRecord) -> Result<i64, StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError` if the rows cannot be read.
    async fn attempts_for_user(
        &self,
        user_id: &UserId,
    ) -> Result<Vec<ExerciseAttemptRecord>, StorageError>;
}

#[async_trait]
pub trait TestResultRepository: Send + Sync {
    /// Append a result row without touching revision requirements.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the row cannot be stored.
    async fn append_result(&self, record: &TestResultRecord) -> Result<i64, StorageError>;

    /// All results for a user, oldest first.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the rows cannot be read.
    async fn results_for_user(&self, user_id: &UserId)
    -> Result<Vec<TestResultRecord>, StorageError>;

    /// Attempt history for one test, newest first.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the rows cannot be read.
    async fn results_for_test(
        &self,
        user_id: &UserId,
        module_id: &ModuleId,
        test_id: &TestId,
    ) -> Result<Vec<TestResultRecord>, StorageError>;
}

#[async_trait]
pub trait RevisionRequirementRepository: Send + Sync {
    /// Store the requirement, replacing any earlier one for the same (user, module, test).
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the row cannot be stored.
    async fn upsert_requirement(
        &self,
        user_id: &UserId,
        requirement: &RevisionRequirement,
    ) -> Result<(), StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError` if the rows cannot be read.
    async fn requirements_for_user(
        &self,
        user_id: &UserId,
    ) -> Result<Vec<RevisionRequirement>, StorageError>;

    /// Mark the outstanding requirement for (user, module, test) as cleared.
    ///
    /// Returns the updated requirement, or `None` when nothing was outstanding.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the update fails.
    async fn complete_requirement(
        &self,
        user_id: &UserId,
        module_id: &ModuleId,
        test_id: &TestId,
        completed_at: DateTime<Utc>,
    ) -> Result<Option<RevisionRequirement>, StorageError>;
}

/// Writes a test attempt and its revision requirement as one unit.
#[async_trait]
pub trait TestAttemptPersistence: Send + Sync {
    /// Append `result` and, when given, upsert `requirement` in the same transaction.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Conflict` if the requirement does not belong to the
    /// same module and test as the result, or other storage errors. On error
    /// neither write is visible.
    async fn record_test_attempt(
        &self,
        result: &TestResultRecord,
        requirement: Option<&RevisionRequirement>,
    ) -> Result<i64, StorageError>;
}

fn requirement_matches(result: &TestResultRecord, requirement: &RevisionRequirement) -> bool {
    requirement.module_id == result.module_id && requirement.test_id == result.test_id
}

//
// ─── IN-MEMORY ─────────────────────────────────────────────────────────────────
//

type LessonKey = (UserId, ModuleId, LessonId);
type RequirementKey = (UserId, ModuleId, TestId);

#[derive(Default)]
struct MemoryState {
    lessons: HashMap<LessonKey, LessonProgressRecord>,
    attempts: Vec<ExerciseAttemptRecord>,
    results: Vec<TestResultRecord>,
    requirements: HashMap<RequirementKey, RevisionRequirement>,
    next_id: i64,
}

impl MemoryState {
    fn next_row_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }
}

/// Simple in-memory repository implementation for testing and prototyping.
#[derive(Clone, Default)]
pub struct InMemoryRepository {
    state: Arc<Mutex<MemoryState>>,
}

impl InMemoryRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, MemoryState>, StorageError> {
        self.state
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))
    }
}

#[async_trait]
impl LessonProgressRepository for InMemoryRepository {
    async fn upsert_lesson_progress(
        &self,
        record: &LessonProgressRecord,
    ) -> Result<(), StorageError> {
        let mut guard = self.lock()?;
        let key = (
            record.user_id.clone(),
            record.module_id.clone(),
            record.lesson_id.clone(),
        );
        guard.lessons.insert(key, record.clone());
        Ok(())
    }

    async fn lesson_progress_for_user(
        &self,
        user_id: &UserId,
    ) -> Result<Vec<LessonProgressRecord>, StorageError> {
        let guard = self.lock()?;
        let mut rows: Vec<_> = guard
            .lessons
            .values()
            .filter(|r| &r.user_id == user_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| a.completed_at.cmp(&b.completed_at));
        Ok(rows)
    }
}

#[async_trait]
impl ExerciseAttemptRepository for InMemoryRepository {
    async fn append_attempt(&self, record: &ExerciseAttemptRecord) -> Result<i64, StorageError> {
        let mut guard = self.lock()?;
        let id = guard.next_row_id();
        let mut row = record.clone();
        row.id = Some(id);
        guard.attempts.push(row);
        Ok(id)
    }

    async fn attempts_for_user(
        &self,
        user_id: &UserId,
    ) -> Result<Vec<ExerciseAttemptRecord>, StorageError> {
        let guard = self.lock()?;
        Ok(guard
            .attempts
            .iter()
            .filter(|r| &r.user_id == user_id)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl TestResultRepository for InMemoryRepository {
    async fn append_result(&self, record: &TestResultRecord) -> Result<i64, StorageError> {
        let mut guard = self.lock()?;
        let id = guard.next_row_id();
        let mut row = record.clone();
        row.id = Some(id);
        guard.results.push(row);
        Ok(id)
    }

    async fn results_for_user(
        &self,
        user_id: &UserId,
    ) -> Result<Vec<TestResultRecord>, StorageError> {
        let guard = self.lock()?;
        let mut rows: Vec<_> = guard
            .results
            .iter()
            .filter(|r| &r.user_id == user_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| a.completed_at.cmp(&b.completed_at).then(a.id.cmp(&b.id)));
        Ok(rows)
    }

    async fn results_for_test(
        &self,
        user_id: &UserId,
        module_id: &ModuleId,
        test_id: &TestId,
    ) -> Result<Vec<TestResultRecord>, StorageError> {
        let mut rows: Vec<_> = self
            .results_for_user(user_id)
            .await?
            .into_iter()
            .filter(|r| &r.module_id == module_id && &r.test_id == test_id)
            .collect();
        rows.reverse();
        Ok(rows)
    }
}

#[async_trait]
impl RevisionRequirementRepository for InMemoryRepository {
    async fn upsert_requirement(
        &self,
        user_id: &UserId,
        requirement: &RevisionRequirement,
    ) -> Result<(), StorageError> {
        let mut guard = self.lock()?;
        let key = (
            user_id.clone(),
            requirement.module_id.clone(),
            requirement.test_id.clone(),
        );
        guard.requirements.insert(key, requirement.clone());
        Ok(())
    }

    async fn requirements_for_user(
        &self,
        user_id: &UserId,
    ) -> Result<Vec<RevisionRequirement>, StorageError> {
        let guard = self.lock()?;
        let mut rows: Vec<_> = guard
            .requirements
            .iter()
            .filter(|((owner, _, _), _)| owner == user_id)
            .map(|(_, req)| req.clone())
            .collect();
        rows.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(rows)
    }

    async fn complete_requirement(
        &self,
        user_id: &UserId,
        module_id: &ModuleId,
        test_id: &TestId,
        completed_at: DateTime<Utc>,
    ) -> Result<Option<RevisionRequirement>, StorageError> {
        let mut guard = self.lock()?;
        let key = (user_id.clone(), module_id.clone(), test_id.clone());
        let cleared = match guard.requirements.get(&key) {
            Some(req) if req.is_outstanding() => req.cleared(completed_at),
            _ => return Ok(None),
        };
        guard.requirements.insert(key, cleared.clone());
        Ok(Some(cleared))
    }
}

#[async_trait]
impl TestAttemptPersistence for InMemoryRepository {
    async fn record_test_attempt(
        &self,
        result: &TestResultRecord,
        requirement: Option<&RevisionRequirement>,
    ) -> Result<i64, StorageError> {
        if requirement.is_some_and(|req| !requirement_matches(result, req)) {
            return Err(StorageError::Conflict);
        }

        // Single lock scope keeps both writes atomic for readers.
        let mut guard = self.lock()?;
        let id = guard.next_row_id();
        let mut row = result.clone();
        row.id = Some(id);
        guard.results.push(row);

        if let Some(req) = requirement {
            let key = (
                result.user_id.clone(),
                req.module_id.clone(),
                req.test_id.clone(),
            );
            guard.requirements.insert(key, req.clone());
        }
        Ok(id)
    }
}

//
// ─── AGGREGATE ─────────────────────────────────────────────────────────────────
//

/// Aggregates the progress repositories behind trait objects for easy backend swapping.
#[derive(Clone)]
pub struct Storage {
    pub lessons: Arc<dyn LessonProgressRepository>,
    pub exercises: Arc<dyn ExerciseAttemptRepository>,
    pub test_results: Arc<dyn TestResultRepository>,
    pub revisions: Arc<dyn RevisionRequirementRepository>,
    pub test_attempts: Arc<dyn TestAttemptPersistence>,
}

impl Storage {
    #[must_use]
    pub fn in_memory() -> Self {
        Self::from_backend(InMemoryRepository::new())
    }

    /// Use one backend value for every collection.
    #[must_use]
    pub fn from_backend<R>(repo: R) -> Self
    where
        R: LessonProgressRepository
            + ExerciseAttemptRepository
            + TestResultRepository
            + RevisionRequirementRepository
            + TestAttemptPersistence
            + Clone
            + 'static,
    {
        Self {
            lessons: Arc::new(repo.clone()),
            exercises: Arc::new(repo.clone()),
            test_results: Arc::new(repo.clone()),
            revisions: Arc::new(repo.clone()),
            test_attempts: Arc::new(repo),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use course_core::time::fixed_now;

    fn user() -> UserId {
        UserId::new("user-1")
    }

    fn result(score: f64, passed: bool, offset_secs: i64) -> TestResultRecord {
        TestResultRecord::new(
            user(),
            ModuleId::new("m"),
            TestId::new("t"),
            score,
            passed,
            fixed_now() + Duration::seconds(offset_secs),
        )
    }

    #[tokio::test]
    async fn lesson_upsert_is_keyed_by_natural_key() {
        let repo = InMemoryRepository::new();
        let record = LessonProgressRecord {
            user_id: user(),
            module_id: ModuleId::new("m"),
            lesson_id: LessonId::new("l1"),
            completed: true,
            completed_at: fixed_now(),
        };
        repo.upsert_lesson_progress(&record).await.unwrap();
        repo.upsert_lesson_progress(&record).await.unwrap();

        let rows = repo.lesson_progress_for_user(&user()).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert!(
            repo.lesson_progress_for_user(&UserId::new("other"))
                .await
                .unwrap()
                .is_empty()
        );
    }

    #[tokio::test]
    async fn failing_attempt_and_requirement_land_together() {
        let repo = InMemoryRepository::new();
        let failed = result(65.0, false, 0);
        let req = RevisionRequirement::outstanding(
            ModuleId::new("m"),
            TestId::new("t"),
            65.0,
            70,
            fixed_now(),
        );
        repo.record_test_attempt(&failed, Some(&req)).await.unwrap();

        let reqs = repo.requirements_for_user(&user()).await.unwrap();
        assert_eq!(reqs.len(), 1);
        assert!(reqs[0].is_outstanding());
        assert_eq!(repo.results_for_user(&user()).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn mismatched_requirement_is_a_conflict() {
        let repo = InMemoryRepository::new();
        let req = RevisionRequirement::outstanding(
            ModuleId::new("m"),
            TestId::new("other"),
            10.0,
            70,
            fixed_now(),
        );
        let err = repo
            .record_test_attempt(&result(10.0, false, 0), Some(&req))
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::Conflict));
        assert!(repo.results_for_user(&user()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn history_is_newest_first() {
        let repo = InMemoryRepository::new();
        repo.append_result(&result(40.0, false, 0)).await.unwrap();
        repo.append_result(&result(90.0, true, 60)).await.unwrap();

        let history = repo
            .results_for_test(&user(), &ModuleId::new("m"), &TestId::new("t"))
            .await
            .unwrap();
        assert_eq!(history.len(), 2);
        assert!(history[0].passed);
        assert!(history[0].id.is_some());
    }

    #[tokio::test]
    async fn completing_requires_an_outstanding_row() {
        let repo = InMemoryRepository::new();
        let m = ModuleId::new("m");
        let t = TestId::new("t");
        assert!(
            repo.complete_requirement(&user(), &m, &t, fixed_now())
                .await
                .unwrap()
                .is_none()
        );

        let req = RevisionRequirement::outstanding(m.clone(), t.clone(), 50.0, 70, fixed_now());
        repo.upsert_requirement(&user(), &req).await.unwrap();
        let cleared = repo
            .complete_requirement(&user(), &m, &t, fixed_now())
            .await
            .unwrap()
            .unwrap();
        assert!(!cleared.is_outstanding());
        assert!(
            repo.complete_requirement(&user(), &m, &t, fixed_now())
                .await
                .unwrap()
                .is_none()
        );
    }
}
