use std::collections::HashMap;

use chrono::{DateTime, Utc};

use course_core::model::{
    CompletionChange, Module, ModuleId, ModuleProgress, RevisionRequirement, TestId, UserId,
};
use storage::repository::{
    ExerciseAttemptRecord, LessonProgressRecord, TestResultRecord,
};

/// User-scoped cache of progress records and revision requirements.
///
/// Records are replaced whole; readers never observe a half-applied update.
#[derive(Debug, Clone, Default)]
pub(crate) struct ProgressIndex {
    user: Option<UserId>,
    modules: HashMap<ModuleId, ModuleProgress>,
    requirements: HashMap<(ModuleId, TestId), RevisionRequirement>,
}

/// Rows read back from storage for one user.
pub(crate) struct HydrationRows {
    pub lessons: Vec<LessonProgressRecord>,
    pub attempts: Vec<ExerciseAttemptRecord>,
    /// Oldest first.
    pub results: Vec<TestResultRecord>,
    pub requirements: Vec<RevisionRequirement>,
}

impl ProgressIndex {
    pub(crate) fn for_user(user: UserId) -> Self {
        Self {
            user: Some(user),
            ..Self::default()
        }
    }

    pub(crate) fn belongs_to(&self, user: &UserId) -> bool {
        self.user.as_ref() == Some(user)
    }

    pub(crate) fn user(&self) -> Option<&UserId> {
        self.user.as_ref()
    }

    pub(crate) fn module(&self, module_id: &ModuleId) -> Option<&ModuleProgress> {
        self.modules.get(module_id)
    }

    pub(crate) fn module_ids(&self) -> Vec<ModuleId> {
        self.modules.keys().cloned().collect()
    }

    /// Current record for `module_id`, or a fresh one started at `now`.
    pub(crate) fn module_or_new(&self, module_id: &ModuleId, now: DateTime<Utc>) -> ModuleProgress {
        self.modules
            .get(module_id)
            .cloned()
            .unwrap_or_else(|| ModuleProgress::new(module_id.clone(), now))
    }

    pub(crate) fn requirement(
        &self,
        module_id: &ModuleId,
        test_id: &TestId,
    ) -> Option<&RevisionRequirement> {
        self.requirements
            .get(&(module_id.clone(), test_id.clone()))
    }

    pub(crate) fn outstanding(
        &self,
        module_id: &ModuleId,
        test_id: &TestId,
    ) -> Option<&RevisionRequirement> {
        self.requirement(module_id, test_id)
            .filter(|r| r.is_outstanding())
    }

    pub(crate) fn has_outstanding(&self, module_id: &ModuleId, test_id: &TestId) -> bool {
        self.outstanding(module_id, test_id).is_some()
    }

    pub(crate) fn replace_module(&mut self, progress: ModuleProgress) {
        self.modules.insert(progress.module_id().clone(), progress);
    }

    pub(crate) fn replace_requirement(&mut self, requirement: RevisionRequirement) {
        let key = (requirement.module_id.clone(), requirement.test_id.clone());
        self.requirements.insert(key, requirement);
    }

    pub(crate) fn replace_requirements(&mut self, requirements: Vec<RevisionRequirement>) {
        self.requirements.clear();
        for req in requirements {
            self.replace_requirement(req);
        }
    }

    /// Re-evaluates completion of `progress` against the requirements held here.
    pub(crate) fn reconcile(
        &self,
        progress: &mut ModuleProgress,
        module: &Module,
        now: DateTime<Utc>,
    ) -> CompletionChange {
        let module_id = module.id.clone();
        progress.reconcile_completion(module, |test| self.has_outstanding(&module_id, test), now)
    }

    /// Rebuilds an index from stored rows.
    ///
    /// The latest result per test wins; a module's start is its earliest row.
    /// Completion flags are left for the caller to reconcile against the catalog.
    pub(crate) fn hydrate(user: UserId, rows: HydrationRows) -> Self {
        let mut index = Self::for_user(user);

        let mut started: HashMap<ModuleId, DateTime<Utc>> = HashMap::new();
        let mut note_start = |module: &ModuleId, at: DateTime<Utc>| {
            started
                .entry(module.clone())
                .and_modify(|t| *t = (*t).min(at))
                .or_insert(at);
        };
        for row in &rows.lessons {
            note_start(&row.module_id, row.completed_at);
        }
        for row in &rows.attempts {
            note_start(&row.module_id, row.attempted_at);
        }
        for row in &rows.results {
            note_start(&row.module_id, row.completed_at);
        }

        for (module_id, at) in started {
            index.replace_module(ModuleProgress::new(module_id, at));
        }

        for row in rows.lessons.iter().filter(|r| r.completed) {
            index.apply(&row.module_id, |p| p.with_lesson(&row.lesson_id));
        }
        for row in rows.attempts.iter().filter(|r| r.correct) {
            index.apply(&row.module_id, |p| {
                p.with_exercise(&row.lesson_id, &row.exercise_id)
            });
        }

        let mut results = rows.results;
        results.sort_by_key(|r| r.completed_at);
        for row in &results {
            index.apply(&row.module_id, |p| {
                Some(p.with_test_result(&row.test_id, row.to_result()))
            });
        }

        index.replace_requirements(rows.requirements);
        index
    }

    fn apply(
        &mut self,
        module_id: &ModuleId,
        update: impl FnOnce(&ModuleProgress) -> Option<ModuleProgress>,
    ) {
        if let Some(next) = self.modules.get(module_id).and_then(update) {
            self.replace_module(next);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use course_core::model::{LessonId, TestResult};
    use course_core::time::fixed_now;

    fn user() -> UserId {
        UserId::new("u1")
    }

    #[test]
    fn hydrate_keeps_latest_result_and_earliest_start() {
        let module = ModuleId::new("m1");
        let test = TestId::new("t1");
        let now = fixed_now();
        let rows = HydrationRows {
            lessons: vec![LessonProgressRecord {
                user_id: user(),
                module_id: module.clone(),
                lesson_id: LessonId::new("l1"),
                completed: true,
                completed_at: now + Duration::minutes(1),
            }],
            attempts: Vec::new(),
            results: vec![
                TestResultRecord::new(user(), module.clone(), test.clone(), 90.0, true, now + Duration::hours(2)),
                TestResultRecord::new(user(), module.clone(), test.clone(), 40.0, false, now),
            ],
            requirements: vec![RevisionRequirement::outstanding(
                module.clone(),
                test.clone(),
                40.0,
                70,
                now,
            )],
        };

        let index = ProgressIndex::hydrate(user(), rows);
        let progress = index.module(&module).expect("module progress");

        assert!(index.belongs_to(&user()));
        assert_eq!(progress.started_at(), now);
        assert!(progress.is_lesson_completed(&LessonId::new("l1")));
        assert_eq!(
            progress.test_result(&test),
            Some(&TestResult {
                score: 90.0,
                passed: true,
                completed_at: now + Duration::hours(2),
            })
        );
        assert!(index.has_outstanding(&module, &test));
    }

    #[test]
    fn cleared_requirements_are_not_outstanding() {
        let module = ModuleId::new("m1");
        let test = TestId::new("t1");
        let mut index = ProgressIndex::for_user(user());
        let req = RevisionRequirement::outstanding(module.clone(), test.clone(), 10.0, 70, fixed_now());
        index.replace_requirement(req.cleared(fixed_now()));

        assert!(index.requirement(&module, &test).is_some());
        assert!(!index.has_outstanding(&module, &test));
    }
}
