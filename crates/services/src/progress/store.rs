use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use course_core::catalog::ContentCatalog;
use course_core::model::{
    CompletionChange, ExerciseId, LessonId, Module, ModuleId, ModuleOverview, ModuleProgress,
    RevisionRequirement, TestId, TestResult, UserId,
};
use course_core::Clock;
use storage::repository::{
    ExerciseAttemptRecord, LessonProgressRecord, Storage, TestResultRecord,
};

use super::guard::{ActionKey, InFlight, InFlightGuard};
use super::index::{HydrationRows, ProgressIndex};
use crate::auth::AuthProvider;
use crate::error::ProgressError;
use crate::events::{EventBus, Notice, ProgressEvent};

/// Owns the signed-in user's progress and revision requirements.
///
/// Every mutation is write-then-update-cache: the durable write completes
/// first and the cached record is swapped only on success. Mutations are
/// serialized through one writer lock; queries read the cache and never
/// touch storage.
pub struct ProgressStore {
    clock: Clock,
    catalog: Arc<dyn ContentCatalog>,
    storage: Storage,
    auth: Arc<dyn AuthProvider>,
    events: EventBus,
    index: RwLock<ProgressIndex>,
    writer: Mutex<()>,
    pending: InFlight,
}

impl ProgressStore {
    #[must_use]
    pub fn new(
        clock: Clock,
        catalog: Arc<dyn ContentCatalog>,
        storage: Storage,
        auth: Arc<dyn AuthProvider>,
        events: EventBus,
    ) -> Self {
        Self {
            clock,
            catalog,
            storage,
            auth,
            events,
            index: RwLock::new(ProgressIndex::default()),
            writer: Mutex::new(()),
            pending: InFlight::default(),
        }
    }

    #[must_use]
    pub fn catalog(&self) -> &Arc<dyn ContentCatalog> {
        &self.catalog
    }

    #[must_use]
    pub fn events(&self) -> &EventBus {
        &self.events
    }

    #[must_use]
    pub fn clock(&self) -> Clock {
        self.clock
    }

    //
    // ─── LIFECYCLE ─────────────────────────────────────────────────────────────
    //

    /// Rebuilds the cache from storage for the signed-in user.
    ///
    /// # Errors
    ///
    /// Returns `ProgressError::Unauthenticated` without a user and
    /// `ProgressError::Storage` if any collection cannot be read; the previous
    /// cache is kept in that case.
    pub async fn load_current_user(&self) -> Result<(), ProgressError> {
        self.load_inner().await.map_err(|e| self.surface("load progress", e))
    }

    async fn load_inner(&self) -> Result<(), ProgressError> {
        let user = self.require_user()?;
        let _pending = self.claim(ActionKey::Load)?;
        let _writer = self.writer.lock().await;

        let rows = HydrationRows {
            lessons: self.storage.lessons.lesson_progress_for_user(&user).await?,
            attempts: self.storage.exercises.attempts_for_user(&user).await?,
            results: self.storage.test_results.results_for_user(&user).await?,
            requirements: self.storage.revisions.requirements_for_user(&user).await?,
        };
        let mut index = ProgressIndex::hydrate(user.clone(), rows);

        let now = self.clock.now();
        for module_id in index.module_ids() {
            let module = match self.catalog.module_by_id(&module_id) {
                Ok(module) => module,
                Err(_) => {
                    warn!(module = %module_id, "stored progress for unknown module");
                    continue;
                }
            };
            let Some(mut progress) = index.module(&module_id).cloned() else {
                continue;
            };
            index.reconcile(&mut progress, module, now);
            index.replace_module(progress);
        }

        let modules = index.module_ids().len();
        *self.write_index() = index;
        info!(user = %user, modules, "progress loaded");
        self.events.publish(ProgressEvent::Loaded { user_id: user });
        Ok(())
    }

    /// Drops the cache, e.g. on sign-out.
    pub fn clear(&self) {
        *self.write_index() = ProgressIndex::default();
        debug!("progress cache cleared");
        self.events.publish(ProgressEvent::Cleared);
    }

    //
    // ─── MUTATIONS ─────────────────────────────────────────────────────────────
    //

    /// Records a completed lesson. Repeating the call changes nothing.
    ///
    /// # Errors
    ///
    /// Returns `ProgressError` for a missing user, unknown ids, a duplicate
    /// in-flight call or a storage failure. The cache is untouched on error.
    pub async fn mark_lesson_complete(
        &self,
        module_id: &ModuleId,
        lesson_id: &LessonId,
    ) -> Result<(), ProgressError> {
        self.mark_lesson_inner(module_id, lesson_id)
            .await
            .map_err(|e| self.surface("save lesson progress", e))
    }

    async fn mark_lesson_inner(
        &self,
        module_id: &ModuleId,
        lesson_id: &LessonId,
    ) -> Result<(), ProgressError> {
        let user = self.require_user()?;
        let module = self.catalog.module_by_id(module_id)?;
        self.catalog.lesson_by_id(module_id, lesson_id)?;

        let _pending = self.claim(ActionKey::Lesson(module_id.clone(), lesson_id.clone()))?;
        let _writer = self.writer.lock().await;

        let now = self.clock.now();
        let current = self.current_record(&user, module_id, now);
        let Some(next) = current.with_lesson(lesson_id) else {
            debug!(module = %module_id, lesson = %lesson_id, "lesson already complete");
            self.reconcile_cached(module);
            return Ok(());
        };

        self.storage
            .lessons
            .upsert_lesson_progress(&LessonProgressRecord {
                user_id: user,
                module_id: module_id.clone(),
                lesson_id: lesson_id.clone(),
                completed: true,
                completed_at: now,
            })
            .await?;

        self.commit(module, next, |_| {});
        self.events.publish(ProgressEvent::LessonCompleted {
            module_id: module_id.clone(),
            lesson_id: lesson_id.clone(),
        });
        Ok(())
    }

    /// Records a correct exercise attempt. Repeating the call changes nothing.
    ///
    /// # Errors
    ///
    /// Same as [`ProgressStore::mark_lesson_complete`], plus
    /// `ProgressError::ExerciseNotFound` when the lesson has no such exercise.
    pub async fn mark_exercise_complete(
        &self,
        module_id: &ModuleId,
        lesson_id: &LessonId,
        exercise_id: &ExerciseId,
    ) -> Result<(), ProgressError> {
        self.mark_exercise_inner(module_id, lesson_id, exercise_id)
            .await
            .map_err(|e| self.surface("save exercise progress", e))
    }

    async fn mark_exercise_inner(
        &self,
        module_id: &ModuleId,
        lesson_id: &LessonId,
        exercise_id: &ExerciseId,
    ) -> Result<(), ProgressError> {
        let user = self.require_user()?;
        let module = self.catalog.module_by_id(module_id)?;
        let lesson = self.catalog.lesson_by_id(module_id, lesson_id)?;
        if lesson.exercise(exercise_id).is_none() {
            return Err(ProgressError::ExerciseNotFound {
                lesson: lesson_id.clone(),
                exercise: exercise_id.clone(),
            });
        }

        let _pending = self.claim(ActionKey::Exercise(
            module_id.clone(),
            lesson_id.clone(),
            exercise_id.clone(),
        ))?;
        let _writer = self.writer.lock().await;

        let now = self.clock.now();
        let current = self.current_record(&user, module_id, now);
        let Some(next) = current.with_exercise(lesson_id, exercise_id) else {
            debug!(exercise = %exercise_id, "exercise already complete");
            self.reconcile_cached(module);
            return Ok(());
        };

        self.storage
            .exercises
            .append_attempt(&ExerciseAttemptRecord {
                id: None,
                user_id: user,
                module_id: module_id.clone(),
                lesson_id: lesson_id.clone(),
                exercise_id: exercise_id.clone(),
                correct: true,
                attempted_at: now,
            })
            .await?;

        self.commit(module, next, |_| {});
        self.events.publish(ProgressEvent::ExerciseCompleted {
            module_id: module_id.clone(),
            lesson_id: lesson_id.clone(),
            exercise_id: exercise_id.clone(),
        });
        Ok(())
    }

    /// Records a test attempt as the latest result for the test.
    ///
    /// A failing attempt creates an outstanding revision requirement in the
    /// same durable write, snapshotting the test's passing score.
    ///
    /// # Errors
    ///
    /// Returns `ProgressError::InvalidScore` for a score outside `0..=100`
    /// and the same failures as the other mutations.
    pub async fn mark_test_complete(
        &self,
        module_id: &ModuleId,
        test_id: &TestId,
        score: f64,
        passed: bool,
    ) -> Result<TestResult, ProgressError> {
        self.mark_test_inner(module_id, test_id, score, passed)
            .await
            .map_err(|e| self.surface("save test result", e))
    }

    async fn mark_test_inner(
        &self,
        module_id: &ModuleId,
        test_id: &TestId,
        score: f64,
        passed: bool,
    ) -> Result<TestResult, ProgressError> {
        let user = self.require_user()?;
        if !(0.0..=100.0).contains(&score) {
            return Err(ProgressError::InvalidScore(score));
        }
        let module = self.catalog.module_by_id(module_id)?;
        let test = self.catalog.test_by_id(module_id, test_id)?;

        let _pending = self.claim(ActionKey::Test(module_id.clone(), test_id.clone()))?;
        let _writer = self.writer.lock().await;

        let now = self.clock.now();
        let record = TestResultRecord::new(
            user.clone(),
            module_id.clone(),
            test_id.clone(),
            score,
            passed,
            now,
        );
        let requirement = (!passed).then(|| {
            RevisionRequirement::outstanding(
                module_id.clone(),
                test_id.clone(),
                score,
                test.passing_score,
                now,
            )
        });

        self.storage
            .test_attempts
            .record_test_attempt(&record, requirement.as_ref())
            .await?;

        let result = record.to_result();
        let next = self
            .current_record(&user, module_id, now)
            .with_test_result(test_id, result.clone());
        let created = requirement.clone();
        self.commit(module, next, move |index| {
            if let Some(req) = created {
                index.replace_requirement(req);
            }
        });

        info!(
            module = %module_id,
            test = %test_id,
            score,
            passed,
            "test result recorded"
        );
        self.events.publish(ProgressEvent::TestRecorded {
            module_id: module_id.clone(),
            test_id: test_id.clone(),
            result: result.clone(),
        });
        if let Some(req) = requirement {
            self.events.publish(ProgressEvent::RevisionRequired(req));
        }
        Ok(result)
    }

    /// Clears the outstanding revision requirement for a test.
    ///
    /// Returns `true` if a requirement was cleared and `false` if none was
    /// outstanding in storage, in which case the cached requirements are
    /// refreshed from storage.
    ///
    /// # Errors
    ///
    /// Returns `ProgressError` for a missing user, unknown ids, a duplicate
    /// in-flight call or a storage failure.
    pub async fn mark_revision_completed(
        &self,
        module_id: &ModuleId,
        test_id: &TestId,
    ) -> Result<bool, ProgressError> {
        self.mark_revision_inner(module_id, test_id)
            .await
            .map_err(|e| self.surface("save revision progress", e))
    }

    async fn mark_revision_inner(
        &self,
        module_id: &ModuleId,
        test_id: &TestId,
    ) -> Result<bool, ProgressError> {
        let user = self.require_user()?;
        let module = self.catalog.module_by_id(module_id)?;
        self.catalog.test_by_id(module_id, test_id)?;

        let _pending = self.claim(ActionKey::Revision(module_id.clone(), test_id.clone()))?;
        let _writer = self.writer.lock().await;

        let now = self.clock.now();
        let cleared = self
            .storage
            .revisions
            .complete_requirement(&user, module_id, test_id, now)
            .await?;

        let Some(cleared) = cleared else {
            debug!(module = %module_id, test = %test_id, "no outstanding revision in storage");
            let stored = self.storage.revisions.requirements_for_user(&user).await?;
            let refreshed = {
                let mut index = self.write_index();
                let owned = index.belongs_to(&user);
                if owned {
                    index.replace_requirements(stored);
                }
                owned
            };
            if refreshed {
                self.reconcile_cached(module);
            }
            return Ok(false);
        };

        let next = self.current_record(&user, module_id, now);
        self.commit(module, next, move |index| index.replace_requirement(cleared));
        info!(module = %module_id, test = %test_id, "revision completed");
        self.events.publish(ProgressEvent::RevisionCleared {
            module_id: module_id.clone(),
            test_id: test_id.clone(),
        });
        Ok(true)
    }

    /// Recomputes the completion invariant for a module and returns it.
    ///
    /// Safe to call any number of times; it never writes to storage.
    ///
    /// # Errors
    ///
    /// Returns `ProgressError::Unauthenticated` without a user and
    /// `ProgressError::Catalog` for an unknown module.
    pub async fn check_and_mark_module_complete(
        &self,
        module_id: &ModuleId,
    ) -> Result<bool, ProgressError> {
        self.check_inner(module_id)
            .await
            .map_err(|e| self.surface("check module completion", e))
    }

    async fn check_inner(&self, module_id: &ModuleId) -> Result<bool, ProgressError> {
        let user = self.require_user()?;
        let module = self.catalog.module_by_id(module_id)?;
        let _writer = self.writer.lock().await;
        self.ensure_index_for(&user);
        Ok(self.reconcile_cached(module))
    }

    //
    // ─── QUERIES ───────────────────────────────────────────────────────────────
    //

    #[must_use]
    pub fn is_lesson_completed(&self, module_id: &ModuleId, lesson_id: &LessonId) -> bool {
        self.with_module(module_id, |p| p.is_lesson_completed(lesson_id))
            .unwrap_or(false)
    }

    #[must_use]
    pub fn is_exercise_completed(
        &self,
        module_id: &ModuleId,
        lesson_id: &LessonId,
        exercise_id: &ExerciseId,
    ) -> bool {
        self.with_module(module_id, |p| p.is_exercise_completed(lesson_id, exercise_id))
            .unwrap_or(false)
    }

    /// Whether any attempt at the test has been recorded.
    #[must_use]
    pub fn is_test_completed(&self, module_id: &ModuleId, test_id: &TestId) -> bool {
        self.get_test_result(module_id, test_id).is_some()
    }

    /// Latest recorded attempt at the test.
    #[must_use]
    pub fn get_test_result(&self, module_id: &ModuleId, test_id: &TestId) -> Option<TestResult> {
        self.with_module(module_id, |p| p.test_result(test_id).cloned())
            .flatten()
    }

    #[must_use]
    pub fn has_revision_requirement(&self, module_id: &ModuleId, test_id: &TestId) -> bool {
        self.get_revision_requirement(module_id, test_id).is_some()
    }

    /// Outstanding requirement for the test, if any.
    #[must_use]
    pub fn get_revision_requirement(
        &self,
        module_id: &ModuleId,
        test_id: &TestId,
    ) -> Option<RevisionRequirement> {
        let index = self.scoped_index()?;
        index.outstanding(module_id, test_id).cloned()
    }

    /// Number of completed lessons in the module.
    #[must_use]
    pub fn get_module_progress(&self, module_id: &ModuleId) -> usize {
        self.with_module(module_id, ModuleProgress::completed_lesson_count)
            .unwrap_or(0)
    }

    #[must_use]
    pub fn is_module_completed(&self, module_id: &ModuleId) -> bool {
        self.with_module(module_id, ModuleProgress::is_completed)
            .unwrap_or(false)
    }

    /// Snapshot of the whole cached record.
    #[must_use]
    pub fn module_progress(&self, module_id: &ModuleId) -> Option<ModuleProgress> {
        self.with_module(module_id, Clone::clone)
    }

    /// Completed/total counts for progress bars.
    ///
    /// # Errors
    ///
    /// Returns `ProgressError::Catalog` for an unknown module.
    pub fn module_overview(&self, module_id: &ModuleId) -> Result<ModuleOverview, ProgressError> {
        let module = self.catalog.module_by_id(module_id)?;
        let index = self.scoped_index();
        let progress = index.as_ref().and_then(|i| i.module(module_id));
        Ok(ModuleOverview::compute(module, progress))
    }

    /// Every recorded attempt at a test, newest first.
    ///
    /// # Errors
    ///
    /// Returns `ProgressError::Unauthenticated` without a user and
    /// `ProgressError::Storage` if the history cannot be read.
    pub async fn test_history(
        &self,
        module_id: &ModuleId,
        test_id: &TestId,
    ) -> Result<Vec<TestResult>, ProgressError> {
        let user = self.require_user()?;
        let rows = self
            .storage
            .test_results
            .results_for_test(&user, module_id, test_id)
            .await
            .map_err(|e| self.surface("load test history", e.into()))?;
        Ok(rows.iter().map(TestResultRecord::to_result).collect())
    }

    //
    // ─── INTERNALS ─────────────────────────────────────────────────────────────
    //

    fn require_user(&self) -> Result<UserId, ProgressError> {
        self.auth.current_user().ok_or(ProgressError::Unauthenticated)
    }

    fn claim(&self, key: ActionKey) -> Result<InFlightGuard<'_>, ProgressError> {
        let label = key.to_string();
        self.pending
            .begin(key)
            .ok_or(ProgressError::InFlight(label))
    }

    fn surface(&self, action: &str, err: ProgressError) -> ProgressError {
        warn!(action, kind = %err.kind(), error = %err, "progress operation failed");
        self.events
            .notify(Notice::new(err.kind(), format!("Could not {action}: {err}")));
        err
    }

    fn read_index(&self) -> RwLockReadGuard<'_, ProgressIndex> {
        self.index.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_index(&self) -> RwLockWriteGuard<'_, ProgressIndex> {
        self.index.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Cache for the signed-in user, or `None` when signed out or stale.
    fn scoped_index(&self) -> Option<RwLockReadGuard<'_, ProgressIndex>> {
        let user = self.auth.current_user()?;
        let index = self.read_index();
        index.belongs_to(&user).then_some(index)
    }

    fn with_module<T>(&self, module_id: &ModuleId, f: impl FnOnce(&ModuleProgress) -> T) -> Option<T> {
        let index = self.scoped_index()?;
        index.module(module_id).map(f)
    }

    /// Resets the cache when it holds another user's records.
    fn ensure_index_for(&self, user: &UserId) {
        let mut index = self.write_index();
        if !index.belongs_to(user) {
            if let Some(previous) = index.user() {
                warn!(previous = %previous, user = %user, "discarding progress cached for another user");
            }
            *index = ProgressIndex::for_user(user.clone());
        }
    }

    fn current_record(
        &self,
        user: &UserId,
        module_id: &ModuleId,
        now: DateTime<Utc>,
    ) -> ModuleProgress {
        self.ensure_index_for(user);
        self.read_index().module_or_new(module_id, now)
    }

    /// Applies `extra` and swaps in `next` with completion re-evaluated,
    /// all under one write lock.
    fn commit(
        &self,
        module: &Module,
        mut next: ModuleProgress,
        extra: impl FnOnce(&mut ProgressIndex),
    ) {
        let change = {
            let mut index = self.write_index();
            extra(&mut index);
            let change = index.reconcile(&mut next, module, self.clock.now());
            index.replace_module(next);
            change
        };
        self.announce(&module.id, change);
    }

    /// Re-evaluates the cached record; returns the completion state.
    fn reconcile_cached(&self, module: &Module) -> bool {
        let (change, completed) = {
            let mut index = self.write_index();
            let Some(mut progress) = index.module(&module.id).cloned() else {
                return false;
            };
            let change = index.reconcile(&mut progress, module, self.clock.now());
            let completed = progress.is_completed();
            if change != CompletionChange::Unchanged {
                index.replace_module(progress);
            }
            (change, completed)
        };
        self.announce(&module.id, change);
        completed
    }

    fn announce(&self, module_id: &ModuleId, change: CompletionChange) {
        match change {
            CompletionChange::Completed => {
                info!(module = %module_id, "module completed");
                self.events.publish(ProgressEvent::ModuleCompleted {
                    module_id: module_id.clone(),
                });
            }
            CompletionChange::Reopened => {
                info!(module = %module_id, "module reopened");
                self.events.publish(ProgressEvent::ModuleReopened {
                    module_id: module_id.clone(),
                });
            }
            CompletionChange::Unchanged => {}
        }
    }
}
