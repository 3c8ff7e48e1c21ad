use std::collections::BTreeMap;
use std::sync::{Mutex, PoisonError};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use course_core::evaluation::{evaluate, Answer};
use course_core::model::{Exercise, ExerciseId};

/// Read-only view of a session's answers at submit time.
#[derive(Debug, Clone, Copy)]
pub struct AnswerSheet<'a> {
    exercises: &'a [Exercise],
    answers: &'a BTreeMap<ExerciseId, Answer>,
}

impl<'a> AnswerSheet<'a> {
    #[must_use]
    pub fn new(exercises: &'a [Exercise], answers: &'a BTreeMap<ExerciseId, Answer>) -> Self {
        Self { exercises, answers }
    }

    #[must_use]
    pub fn total(&self) -> usize {
        self.exercises.len()
    }

    #[must_use]
    pub fn answered(&self) -> usize {
        self.exercises
            .iter()
            .filter(|ex| self.answers.contains_key(&ex.id))
            .count()
    }

    pub fn entries(&self) -> impl Iterator<Item = (&'a Exercise, Option<&'a Answer>)> + '_ {
        self.exercises
            .iter()
            .map(|ex| (ex, self.answers.get(&ex.id)))
    }
}

/// Turns a finished answer sheet into a count of correct answers.
pub trait ScoringStrategy: Send + Sync {
    fn grade(&self, sheet: &AnswerSheet<'_>) -> usize;
}

/// Stand-in for an external grader: a uniform draw in `0..=answered`.
///
/// Per-question correctness is ignored.
#[derive(Debug, Default)]
pub struct RandomScoring {
    seeded: Option<Mutex<StdRng>>,
}

impl RandomScoring {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Deterministic draws for tests.
    #[must_use]
    pub fn seeded(seed: u64) -> Self {
        Self {
            seeded: Some(Mutex::new(StdRng::seed_from_u64(seed))),
        }
    }
}

impl ScoringStrategy for RandomScoring {
    fn grade(&self, sheet: &AnswerSheet<'_>) -> usize {
        let answered = sheet.answered();
        match &self.seeded {
            Some(rng) => rng
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .random_range(0..=answered),
            None => rand::rng().random_range(0..=answered),
        }
    }
}

/// Every answered question counts as correct.
#[derive(Debug, Clone, Copy, Default)]
pub struct AnsweredScoring;

impl ScoringStrategy for AnsweredScoring {
    fn grade(&self, sheet: &AnswerSheet<'_>) -> usize {
        sheet.answered()
    }
}

/// Judges each answer with the per-exercise rules.
#[derive(Debug, Clone, Copy, Default)]
pub struct EvaluatedScoring;

impl ScoringStrategy for EvaluatedScoring {
    fn grade(&self, sheet: &AnswerSheet<'_>) -> usize {
        sheet
            .entries()
            .filter_map(|(ex, answer)| answer.map(|a| (ex, a)))
            .filter(|(ex, answer)| evaluate(ex, answer).is_ok_and(|v| v.is_correct()))
            .count()
    }
}

/// Always reports the same count, capped at the question total.
#[derive(Debug, Clone, Copy)]
pub struct FixedScoring(pub usize);

impl ScoringStrategy for FixedScoring {
    fn grade(&self, sheet: &AnswerSheet<'_>) -> usize {
        self.0.min(sheet.total())
    }
}
