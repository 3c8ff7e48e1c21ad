#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use course_core::catalog::ContentCatalog;
use course_core::model::{ModuleId, RevisionRequirement, TestId, UserId};
use course_core::time::fixed_clock;
use services::{bundled_catalog, AppServices, SessionAuth};
use storage::repository::{
    ExerciseAttemptRecord, ExerciseAttemptRepository, InMemoryRepository, LessonProgressRecord,
    LessonProgressRepository, RevisionRequirementRepository, Storage, StorageError,
    TestAttemptPersistence, TestResultRecord, TestResultRepository,
};

pub fn learner() -> UserId {
    UserId::new("learner-1")
}

pub fn catalog() -> Arc<dyn ContentCatalog> {
    Arc::new(bundled_catalog().expect("bundled catalog"))
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// In-memory backend with a failure switch and a count of revision completions.
#[derive(Clone, Default)]
pub struct ProbeRepository {
    inner: InMemoryRepository,
    failing: Arc<AtomicBool>,
    revision_completions: Arc<AtomicUsize>,
    lesson_gate: Arc<tokio::sync::Mutex<()>>,
    test_gate: Arc<tokio::sync::Mutex<()>>,
}

impl ProbeRepository {
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn revision_completions(&self) -> usize {
        self.revision_completions.load(Ordering::SeqCst)
    }

    /// Lesson writes wait until the returned guard is dropped.
    pub async fn hold_lesson_writes(&self) -> tokio::sync::OwnedMutexGuard<()> {
        Arc::clone(&self.lesson_gate).lock_owned().await
    }

    /// Test attempt writes wait until the returned guard is dropped.
    pub async fn hold_test_writes(&self) -> tokio::sync::OwnedMutexGuard<()> {
        Arc::clone(&self.test_gate).lock_owned().await
    }

    pub fn inner(&self) -> &InMemoryRepository {
        &self.inner
    }

    fn check(&self) -> Result<(), StorageError> {
        if self.failing.load(Ordering::SeqCst) {
            Err(StorageError::Connection("store offline".into()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl LessonProgressRepository for ProbeRepository {
    async fn upsert_lesson_progress(
        &self,
        record: &LessonProgressRecord,
    ) -> Result<(), StorageError> {
        let _gate = self.lesson_gate.lock().await;
        self.check()?;
        self.inner.upsert_lesson_progress(record).await
    }

    async fn lesson_progress_for_user(
        &self,
        user_id: &UserId,
    ) -> Result<Vec<LessonProgressRecord>, StorageError> {
        self.check()?;
        self.inner.lesson_progress_for_user(user_id).await
    }
}

#[async_trait]
impl ExerciseAttemptRepository for ProbeRepository {
    async fn append_attempt(&self, record: &ExerciseAttemptRecord) -> Result<i64, StorageError> {
        self.check()?;
        self.inner.append_attempt(record).await
    }

    async fn attempts_for_user(
        &self,
        user_id: &UserId,
    ) -> Result<Vec<ExerciseAttemptRecord>, StorageError> {
        self.check()?;
        self.inner.attempts_for_user(user_id).await
    }
}

#[async_trait]
impl TestResultRepository for ProbeRepository {
    async fn append_result(&self, record: &TestResultRecord) -> Result<i64, StorageError> {
        self.check()?;
        self.inner.append_result(record).await
    }

    async fn results_for_user(
        &self,
        user_id: &UserId,
    ) -> Result<Vec<TestResultRecord>, StorageError> {
        self.check()?;
        self.inner.results_for_user(user_id).await
    }

    async fn results_for_test(
        &self,
        user_id: &UserId,
        module_id: &ModuleId,
        test_id: &TestId,
    ) -> Result<Vec<TestResultRecord>, StorageError> {
        self.check()?;
        self.inner.results_for_test(user_id, module_id, test_id).await
    }
}

#[async_trait]
impl RevisionRequirementRepository for ProbeRepository {
    async fn upsert_requirement(
        &self,
        user_id: &UserId,
        requirement: &RevisionRequirement,
    ) -> Result<(), StorageError> {
        self.check()?;
        self.inner.upsert_requirement(user_id, requirement).await
    }

    async fn requirements_for_user(
        &self,
        user_id: &UserId,
    ) -> Result<Vec<RevisionRequirement>, StorageError> {
        self.check()?;
        self.inner.requirements_for_user(user_id).await
    }

    async fn complete_requirement(
        &self,
        user_id: &UserId,
        module_id: &ModuleId,
        test_id: &TestId,
        completed_at: DateTime<Utc>,
    ) -> Result<Option<RevisionRequirement>, StorageError> {
        self.check()?;
        self.revision_completions.fetch_add(1, Ordering::SeqCst);
        self.inner
            .complete_requirement(user_id, module_id, test_id, completed_at)
            .await
    }
}

#[async_trait]
impl TestAttemptPersistence for ProbeRepository {
    async fn record_test_attempt(
        &self,
        result: &TestResultRecord,
        requirement: Option<&RevisionRequirement>,
    ) -> Result<i64, StorageError> {
        let _gate = self.test_gate.lock().await;
        self.check()?;
        self.inner.record_test_attempt(result, requirement).await
    }
}

/// Services for a signed-in learner over a probe backend.
pub fn signed_in() -> (AppServices, ProbeRepository, SessionAuth) {
    let repo = ProbeRepository::default();
    let auth = SessionAuth::signed_in(learner());
    let services = AppServices::with_storage(
        catalog(),
        Storage::from_backend(repo.clone()),
        fixed_clock(),
        Arc::new(auth.clone()),
    );
    (services, repo, auth)
}
