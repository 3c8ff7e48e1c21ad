use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::model::ids::{ExerciseId, LessonId, ModuleId, TestId};
use crate::model::module::Module;

//
// ─── TEST RESULT ───────────────────────────────────────────────────────────────
//

/// Latest attempt at a test as held in active state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestResult {
    pub score: f64,
    pub passed: bool,
    pub completed_at: DateTime<Utc>,
}

//
// ─── COMPLETION ────────────────────────────────────────────────────────────────
//

/// What a completion re-evaluation did to the `completed` flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionChange {
    Unchanged,
    Completed,
    /// The module was complete but no longer satisfies the invariant
    /// (a later failing attempt replaced a passing one).
    Reopened,
}

//
// ─── MODULE PROGRESS ───────────────────────────────────────────────────────────
//

/// Per-user completion record for one module.
///
/// Updates never mutate a shared value in place: the `with_*` methods return a
/// new record, which the owner swaps in as a whole.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleProgress {
    module_id: ModuleId,
    completed: bool,
    completed_lessons: BTreeSet<LessonId>,
    completed_exercises: BTreeMap<LessonId, BTreeSet<ExerciseId>>,
    tests_completed: BTreeMap<TestId, TestResult>,
    started_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
}

impl ModuleProgress {
    #[must_use]
    pub fn new(module_id: ModuleId, started_at: DateTime<Utc>) -> Self {
        Self {
            module_id,
            completed: false,
            completed_lessons: BTreeSet::new(),
            completed_exercises: BTreeMap::new(),
            tests_completed: BTreeMap::new(),
            started_at,
            completed_at: None,
        }
    }

    #[must_use]
    pub fn module_id(&self) -> &ModuleId {
        &self.module_id
    }

    #[must_use]
    pub fn is_completed(&self) -> bool {
        self.completed
    }

    #[must_use]
    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    #[must_use]
    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.completed_at
    }

    #[must_use]
    pub fn completed_lessons(&self) -> &BTreeSet<LessonId> {
        &self.completed_lessons
    }

    #[must_use]
    pub fn completed_lesson_count(&self) -> usize {
        self.completed_lessons.len()
    }

    #[must_use]
    pub fn completed_exercises(&self, lesson_id: &LessonId) -> Option<&BTreeSet<ExerciseId>> {
        self.completed_exercises.get(lesson_id)
    }

    #[must_use]
    pub fn tests_completed(&self) -> &BTreeMap<TestId, TestResult> {
        &self.tests_completed
    }

    #[must_use]
    pub fn is_lesson_completed(&self, lesson_id: &LessonId) -> bool {
        self.completed_lessons.contains(lesson_id)
    }

    #[must_use]
    pub fn is_exercise_completed(&self, lesson_id: &LessonId, exercise_id: &ExerciseId) -> bool {
        self.completed_exercises
            .get(lesson_id)
            .is_some_and(|set| set.contains(exercise_id))
    }

    #[must_use]
    pub fn test_result(&self, test_id: &TestId) -> Option<&TestResult> {
        self.tests_completed.get(test_id)
    }

    /// Returns an updated record with the lesson added, or `None` if it was already there.
    #[must_use]
    pub fn with_lesson(&self, lesson_id: &LessonId) -> Option<Self> {
        if self.is_lesson_completed(lesson_id) {
            return None;
        }
        let mut next = self.clone();
        next.completed_lessons.insert(lesson_id.clone());
        Some(next)
    }

    /// Returns an updated record with the exercise added, or `None` if it was already there.
    #[must_use]
    pub fn with_exercise(&self, lesson_id: &LessonId, exercise_id: &ExerciseId) -> Option<Self> {
        if self.is_exercise_completed(lesson_id, exercise_id) {
            return None;
        }
        let mut next = self.clone();
        next.completed_exercises
            .entry(lesson_id.clone())
            .or_default()
            .insert(exercise_id.clone());
        Some(next)
    }

    /// Returns an updated record whose entry for `test_id` is replaced by `result`.
    #[must_use]
    pub fn with_test_result(&self, test_id: &TestId, result: TestResult) -> Self {
        let mut next = self.clone();
        next.tests_completed.insert(test_id.clone(), result);
        next
    }

    /// Checks the module-completion invariant against the catalog definition.
    ///
    /// `outstanding` reports whether a test currently has an uncleared revision
    /// requirement.
    pub fn satisfies_completion(
        &self,
        module: &Module,
        outstanding: impl Fn(&TestId) -> bool,
    ) -> bool {
        let lessons_done = module.lessons.iter().all(|lesson| {
            self.is_lesson_completed(&lesson.id)
                && lesson
                    .exercises
                    .iter()
                    .all(|ex| self.is_exercise_completed(&lesson.id, &ex.id))
        });
        if !lessons_done {
            return false;
        }

        module.tests.iter().all(|test| {
            self.test_result(&test.id).is_some_and(|r| r.passed) && !outstanding(&test.id)
        })
    }

    /// Brings the `completed` flag in line with the invariant.
    ///
    /// Stamps `completed_at` on the transition to complete and clears it on the
    /// way back. Repeated calls with unchanged inputs return `Unchanged`.
    pub fn reconcile_completion(
        &mut self,
        module: &Module,
        outstanding: impl Fn(&TestId) -> bool,
        now: DateTime<Utc>,
    ) -> CompletionChange {
        let satisfied = self.satisfies_completion(module, outstanding);
        match (self.completed, satisfied) {
            (false, true) => {
                self.completed = true;
                self.completed_at = Some(now);
                CompletionChange::Completed
            }
            (true, false) => {
                self.completed = false;
                self.completed_at = None;
                CompletionChange::Reopened
            }
            _ => CompletionChange::Unchanged,
        }
    }
}

//
// ─── OVERVIEW ──────────────────────────────────────────────────────────────────
//

/// Counts for progress bars and the achievements feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleOverview {
    pub module_id: ModuleId,
    pub lessons_completed: usize,
    pub lessons_total: usize,
    pub exercises_completed: usize,
    pub exercises_total: usize,
    pub tests_passed: usize,
    pub tests_total: usize,
    pub completed: bool,
}

impl ModuleOverview {
    #[must_use]
    pub fn compute(module: &Module, progress: Option<&ModuleProgress>) -> Self {
        let lessons_completed = progress.map_or(0, |p| {
            module
                .lessons
                .iter()
                .filter(|l| p.is_lesson_completed(&l.id))
                .count()
        });
        let exercises_completed = progress.map_or(0, |p| {
            module
                .lessons
                .iter()
                .flat_map(|l| l.exercises.iter().map(move |e| (&l.id, &e.id)))
                .filter(|(lesson, ex)| p.is_exercise_completed(lesson, ex))
                .count()
        });
        let tests_passed = progress.map_or(0, |p| {
            module
                .tests
                .iter()
                .filter(|t| p.test_result(&t.id).is_some_and(|r| r.passed))
                .count()
        });

        Self {
            module_id: module.id.clone(),
            lessons_completed,
            lessons_total: module.lessons.len(),
            exercises_completed,
            exercises_total: module.lesson_exercise_count(),
            tests_passed,
            tests_total: module.tests.len(),
            completed: progress.is_some_and(ModuleProgress::is_completed),
        }
    }

    /// Whole-number lesson completion percentage.
    #[must_use]
    pub fn lesson_percentage(&self) -> u8 {
        if self.lessons_total == 0 {
            return 0;
        }
        let pct = self.lessons_completed.saturating_mul(100) / self.lessons_total;
        u8::try_from(pct.min(100)).unwrap_or(100)
    }
}
