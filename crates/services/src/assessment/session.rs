use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};

use course_core::evaluation::Answer;
use course_core::model::{score_percentage, Exercise, ExerciseId, ModuleId, Test, TestResult};

use super::scoring::AnswerSheet;
use crate::error::TestSessionError;

//
// ─── PHASE ─────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TestPhase {
    NotStarted,
    InProgress,
    /// Confirm-submit prompt is open. The countdown keeps running.
    ReviewPending,
    Completed,
}

impl fmt::Display for TestPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            TestPhase::NotStarted => "not started",
            TestPhase::InProgress => "in progress",
            TestPhase::ReviewPending => "awaiting confirmation",
            TestPhase::Completed => "completed",
        };
        f.write_str(label)
    }
}

/// Result of one countdown step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tick {
    Running { remaining_secs: u32 },
    Expired,
}

/// Counts shown in the confirm-submit prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubmitPrompt {
    pub answered: usize,
    pub total: usize,
}

/// Scored submission of one session.
#[derive(Debug, Clone, PartialEq)]
pub struct TestOutcome {
    pub correct: usize,
    pub total: usize,
    pub score: f64,
    pub passed: bool,
    pub time_spent_secs: u32,
    pub auto_submitted: bool,
}

//
// ─── SESSION ───────────────────────────────────────────────────────────────────
//

/// Timed walk through a test's questions.
///
/// Pure state: no clock, no storage. The controller drives ticks and
/// persistence and only calls [`TestSession::finish`] once the result is
/// durably recorded.
#[derive(Debug, Clone)]
pub struct TestSession {
    module_id: ModuleId,
    test: Test,
    phase: TestPhase,
    current: usize,
    answers: BTreeMap<ExerciseId, Answer>,
    remaining_secs: u32,
    started_at: Option<DateTime<Utc>>,
    outcome: Option<TestOutcome>,
    prior: Option<TestResult>,
}

impl TestSession {
    /// A fresh session waiting for `start`.
    ///
    /// # Errors
    ///
    /// Returns `TestSessionError::Empty` if the test has no questions.
    pub fn new(module_id: ModuleId, test: Test) -> Result<Self, TestSessionError> {
        if test.exercises.is_empty() {
            return Err(TestSessionError::Empty);
        }
        let remaining_secs = test.time_limit_secs();
        Ok(Self {
            module_id,
            test,
            phase: TestPhase::NotStarted,
            current: 0,
            answers: BTreeMap::new(),
            remaining_secs,
            started_at: None,
            outcome: None,
            prior: None,
        })
    }

    /// A read-only review of an earlier attempt. `start` begins a retake.
    ///
    /// # Errors
    ///
    /// Returns `TestSessionError::Empty` if the test has no questions.
    pub fn reviewing(
        module_id: ModuleId,
        test: Test,
        prior: TestResult,
    ) -> Result<Self, TestSessionError> {
        let mut session = Self::new(module_id, test)?;
        session.phase = TestPhase::Completed;
        session.prior = Some(prior);
        Ok(session)
    }

    #[must_use]
    pub fn module_id(&self) -> &ModuleId {
        &self.module_id
    }

    #[must_use]
    pub fn test(&self) -> &Test {
        &self.test
    }

    #[must_use]
    pub fn phase(&self) -> TestPhase {
        self.phase
    }

    #[must_use]
    pub fn current_index(&self) -> usize {
        self.current
    }

    #[must_use]
    pub fn current_exercise(&self) -> Option<&Exercise> {
        self.test.exercises.get(self.current)
    }

    #[must_use]
    pub fn total(&self) -> usize {
        self.test.exercises.len()
    }

    #[must_use]
    pub fn answered(&self) -> usize {
        self.answer_sheet().answered()
    }

    #[must_use]
    pub fn answer(&self, exercise_id: &ExerciseId) -> Option<&Answer> {
        self.answers.get(exercise_id)
    }

    #[must_use]
    pub fn remaining_secs(&self) -> u32 {
        self.remaining_secs
    }

    #[must_use]
    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    #[must_use]
    pub fn outcome(&self) -> Option<&TestOutcome> {
        self.outcome.as_ref()
    }

    /// Result shown when the session opened in review.
    #[must_use]
    pub fn prior_result(&self) -> Option<&TestResult> {
        self.prior.as_ref()
    }

    #[must_use]
    pub fn answer_sheet(&self) -> AnswerSheet<'_> {
        AnswerSheet::new(&self.test.exercises, &self.answers)
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        matches!(self.phase, TestPhase::InProgress | TestPhase::ReviewPending)
    }

    /// Begins (or retakes) the test with a full timer and no answers.
    ///
    /// Revision gating is the caller's job.
    ///
    /// # Errors
    ///
    /// Returns `TestSessionError::InvalidTransition` while a run is active.
    pub fn start(&mut self, now: DateTime<Utc>) -> Result<(), TestSessionError> {
        if self.is_running() {
            return Err(self.invalid("start"));
        }
        self.phase = TestPhase::InProgress;
        self.current = 0;
        self.answers.clear();
        self.remaining_secs = self.test.time_limit_secs();
        self.started_at = Some(now);
        self.outcome = None;
        self.prior = None;
        Ok(())
    }

    /// # Errors
    ///
    /// Returns `TestSessionError::InvalidTransition` outside `InProgress`.
    pub fn next(&mut self) -> Result<usize, TestSessionError> {
        self.require_phase(TestPhase::InProgress, "move to the next question")?;
        if self.current + 1 < self.total() {
            self.current += 1;
        }
        Ok(self.current)
    }

    /// # Errors
    ///
    /// Returns `TestSessionError::InvalidTransition` outside `InProgress`.
    pub fn prev(&mut self) -> Result<usize, TestSessionError> {
        self.require_phase(TestPhase::InProgress, "move to the previous question")?;
        self.current = self.current.saturating_sub(1);
        Ok(self.current)
    }

    /// Stores the latest answer for a question and marks it answered.
    ///
    /// # Errors
    ///
    /// Returns `TestSessionError::InvalidTransition` outside `InProgress` and
    /// `TestSessionError::UnknownExercise` for a question not in this test.
    pub fn record_answer(
        &mut self,
        exercise_id: &ExerciseId,
        answer: Answer,
    ) -> Result<(), TestSessionError> {
        self.require_phase(TestPhase::InProgress, "answer")?;
        if !self.test.exercises.iter().any(|ex| &ex.id == exercise_id) {
            return Err(TestSessionError::UnknownExercise(exercise_id.clone()));
        }
        self.answers.insert(exercise_id.clone(), answer);
        Ok(())
    }

    /// Counts one second down.
    ///
    /// # Errors
    ///
    /// Returns `TestSessionError::InvalidTransition` when no run is active.
    pub fn tick(&mut self) -> Result<Tick, TestSessionError> {
        if !self.is_running() {
            return Err(self.invalid("count down"));
        }
        self.remaining_secs = self.remaining_secs.saturating_sub(1);
        Ok(if self.remaining_secs == 0 {
            Tick::Expired
        } else {
            Tick::Running {
                remaining_secs: self.remaining_secs,
            }
        })
    }

    /// Opens the confirm-submit prompt.
    ///
    /// # Errors
    ///
    /// Returns `TestSessionError::InvalidTransition` outside `InProgress`.
    pub fn request_submit(&mut self) -> Result<SubmitPrompt, TestSessionError> {
        self.require_phase(TestPhase::InProgress, "request submission")?;
        self.phase = TestPhase::ReviewPending;
        Ok(SubmitPrompt {
            answered: self.answered(),
            total: self.total(),
        })
    }

    /// Closes the confirm-submit prompt without side effects.
    ///
    /// # Errors
    ///
    /// Returns `TestSessionError::InvalidTransition` outside `ReviewPending`.
    pub fn cancel_submit(&mut self) -> Result<(), TestSessionError> {
        self.require_phase(TestPhase::ReviewPending, "cancel submission")?;
        self.phase = TestPhase::InProgress;
        Ok(())
    }

    /// Scores `correct` answers against this run without changing phase.
    ///
    /// # Errors
    ///
    /// Returns `TestSessionError::InvalidTransition` when no run is active.
    pub fn score(&self, correct: usize, auto_submitted: bool) -> Result<TestOutcome, TestSessionError> {
        if !self.is_running() {
            return Err(self.invalid("submit"));
        }
        let total = self.total();
        let correct = correct.min(total);
        let score = score_percentage(correct, total);
        Ok(TestOutcome {
            correct,
            total,
            score,
            passed: self.test.is_passing(score),
            time_spent_secs: self.test.time_limit_secs().saturating_sub(self.remaining_secs),
            auto_submitted,
        })
    }

    /// Moves to `Completed` with a recorded outcome.
    ///
    /// # Errors
    ///
    /// Returns `TestSessionError::InvalidTransition` when no run is active.
    pub fn finish(&mut self, outcome: TestOutcome) -> Result<(), TestSessionError> {
        if !self.is_running() {
            return Err(self.invalid("complete"));
        }
        self.phase = TestPhase::Completed;
        self.outcome = Some(outcome);
        Ok(())
    }

    fn require_phase(&self, phase: TestPhase, action: &'static str) -> Result<(), TestSessionError> {
        if self.phase == phase {
            Ok(())
        } else {
            Err(self.invalid(action))
        }
    }

    fn invalid(&self, action: &'static str) -> TestSessionError {
        TestSessionError::InvalidTransition {
            action,
            phase: self.phase,
        }
    }
}
