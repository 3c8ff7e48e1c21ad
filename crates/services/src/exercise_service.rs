use std::sync::Arc;

use tracing::debug;

use course_core::evaluation::{evaluate, Answer, Verdict};
use course_core::model::{Exercise, ExerciseContent, ExerciseId, LessonId, ModuleId};

use crate::error::ExerciseError;
use crate::progress::ProgressStore;

//
// ─── WORKSPACE ─────────────────────────────────────────────────────────────────
//

/// Editing state for one lesson exercise. Lives only as long as the view.
#[derive(Debug, Clone, PartialEq)]
pub struct ExerciseWorkspace {
    module_id: ModuleId,
    lesson_id: LessonId,
    exercise: Exercise,
    draft: String,
    hints_revealed: usize,
    solution_revealed: bool,
    attempts: u32,
    last_verdict: Option<Verdict>,
}

impl ExerciseWorkspace {
    #[must_use]
    pub fn new(module_id: ModuleId, lesson_id: LessonId, exercise: Exercise) -> Self {
        let draft = match &exercise.content {
            ExerciseContent::Code(code) => code.starter_code.clone(),
            ExerciseContent::Choice(_) => String::new(),
        };
        Self {
            module_id,
            lesson_id,
            exercise,
            draft,
            hints_revealed: 0,
            solution_revealed: false,
            attempts: 0,
            last_verdict: None,
        }
    }

    #[must_use]
    pub fn exercise(&self) -> &Exercise {
        &self.exercise
    }

    /// Selected option id or code text, depending on the exercise type.
    #[must_use]
    pub fn draft(&self) -> &str {
        &self.draft
    }

    pub fn set_draft(&mut self, draft: impl Into<String>) {
        self.draft = draft.into();
    }

    /// Current draft shaped for the evaluator.
    #[must_use]
    pub fn answer(&self) -> Answer {
        if self.exercise.kind.is_code() {
            Answer::Code(self.draft.clone())
        } else {
            Answer::Choice(self.draft.clone())
        }
    }

    /// Reveals hints in order. Returns `None` once all are shown.
    pub fn reveal_next_hint(&mut self) -> Option<&str> {
        let hint = self.exercise.hints().get(self.hints_revealed)?;
        self.hints_revealed += 1;
        Some(hint.as_str())
    }

    #[must_use]
    pub fn revealed_hints(&self) -> &[String] {
        &self.exercise.hints()[..self.hints_revealed]
    }

    pub fn reveal_solution(&mut self) -> &str {
        self.solution_revealed = true;
        self.exercise.solution()
    }

    #[must_use]
    pub fn solution_revealed(&self) -> bool {
        self.solution_revealed
    }

    #[must_use]
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    #[must_use]
    pub fn last_verdict(&self) -> Option<Verdict> {
        self.last_verdict
    }

    fn record(&mut self, verdict: Verdict) {
        self.attempts = self.attempts.saturating_add(1);
        self.last_verdict = Some(verdict);
    }
}

//
// ─── SERVICE ───────────────────────────────────────────────────────────────────
//

/// Checks lesson exercise answers and records correct ones.
#[derive(Clone)]
pub struct ExerciseService {
    store: Arc<ProgressStore>,
}

impl ExerciseService {
    #[must_use]
    pub fn new(store: Arc<ProgressStore>) -> Self {
        Self { store }
    }

    /// # Errors
    ///
    /// Returns `ExerciseError::Catalog` or `ExerciseError::NotFound` for
    /// unknown ids.
    pub fn open(
        &self,
        module_id: &ModuleId,
        lesson_id: &LessonId,
        exercise_id: &ExerciseId,
    ) -> Result<ExerciseWorkspace, ExerciseError> {
        let lesson = self.store.catalog().lesson_by_id(module_id, lesson_id)?;
        let exercise = lesson
            .exercise(exercise_id)
            .ok_or_else(|| ExerciseError::NotFound {
                lesson: lesson_id.clone(),
                exercise: exercise_id.clone(),
            })?;
        Ok(ExerciseWorkspace::new(
            module_id.clone(),
            lesson_id.clone(),
            exercise.clone(),
        ))
    }

    /// Judges the workspace's draft. A correct answer is recorded as
    /// exercise progress; an incorrect one changes nothing but the workspace.
    ///
    /// # Errors
    ///
    /// Returns `ExerciseError::Evaluation` if the answer shape does not fit
    /// the exercise and `ExerciseError::Progress` if recording fails.
    pub async fn submit(&self, workspace: &mut ExerciseWorkspace) -> Result<Verdict, ExerciseError> {
        let answer = workspace.answer();
        let verdict = if answer.is_blank() {
            Verdict::Incorrect
        } else {
            evaluate(&workspace.exercise, &answer)?
        };
        workspace.record(verdict);
        debug!(
            exercise = %workspace.exercise.id,
            attempts = workspace.attempts,
            correct = verdict.is_correct(),
            "exercise answered"
        );

        if verdict.is_correct() {
            self.store
                .mark_exercise_complete(
                    &workspace.module_id,
                    &workspace.lesson_id,
                    &workspace.exercise.id,
                )
                .await?;
        }
        Ok(verdict)
    }

    #[must_use]
    pub fn is_completed(&self, workspace: &ExerciseWorkspace) -> bool {
        self.store.is_exercise_completed(
            &workspace.module_id,
            &workspace.lesson_id,
            &workspace.exercise.id,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use course_core::model::{CodeContent, Difficulty, ExerciseType};

    fn code_exercise() -> Exercise {
        Exercise {
            id: ExerciseId::new("assign"),
            title: "Assign".into(),
            description: String::new(),
            kind: ExerciseType::CodeWriting,
            difficulty: Difficulty::Easy,
            content: ExerciseContent::Code(CodeContent {
                starter_code: "# assign 10 to number\n".into(),
                solution: "number = 10".into(),
                hints: vec!["Use =".into(), "Name it number".into()],
                test_cases: Vec::new(),
            }),
        }
    }

    fn workspace() -> ExerciseWorkspace {
        ExerciseWorkspace::new(ModuleId::new("m1"), LessonId::new("l1"), code_exercise())
    }

    #[test]
    fn draft_starts_from_starter_code() {
        let ws = workspace();
        assert_eq!(ws.draft(), "# assign 10 to number\n");
        assert_eq!(ws.answer(), Answer::Code("# assign 10 to number\n".into()));
    }

    #[test]
    fn hints_reveal_in_order_and_stop() {
        let mut ws = workspace();
        assert_eq!(ws.reveal_next_hint(), Some("Use ="));
        assert_eq!(ws.reveal_next_hint(), Some("Name it number"));
        assert_eq!(ws.reveal_next_hint(), None);
        assert_eq!(ws.revealed_hints().len(), 2);
    }

    #[test]
    fn revealing_the_solution_is_tracked() {
        let mut ws = workspace();
        assert!(!ws.solution_revealed());
        assert_eq!(ws.reveal_solution(), "number = 10");
        assert!(ws.solution_revealed());
        assert_eq!(ws.attempts(), 0);
    }
}
