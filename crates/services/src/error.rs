//! Shared error types for the services crate.
//!
//! Every service error classifies into a `FailureKind`, which is what the
//! notice channel and the presentation layer branch on.

use std::fmt;

use thiserror::Error;

use course_core::catalog::CatalogError;
use course_core::evaluation::EvaluationError;
use course_core::model::{ExerciseId, LessonId, ModuleId, RevisionRequirement, TestId};
use storage::repository::StorageError;
use storage::sqlite::SqliteInitError;

use crate::assessment::TestPhase;

/// Classification of a failed operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    /// No signed-in user. Blocking; the action is aborted.
    Unauthenticated,
    /// The durable store rejected a read or write. Retryable.
    PersistenceFailure,
    /// Unknown module / lesson / test / exercise. Terminal for the view.
    NotFound,
    /// Retake attempted while a revision requirement is outstanding.
    RevisionGateViolation,
    /// The requested transition is not allowed from the current state.
    InvalidState,
    /// The same action is already in flight.
    Duplicate,
}

impl FailureKind {
    #[must_use]
    pub fn is_retryable(self) -> bool {
        matches!(self, FailureKind::PersistenceFailure | FailureKind::Duplicate)
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            FailureKind::Unauthenticated => "unauthenticated",
            FailureKind::PersistenceFailure => "persistence failure",
            FailureKind::NotFound => "not found",
            FailureKind::RevisionGateViolation => "revision required",
            FailureKind::InvalidState => "invalid state",
            FailureKind::Duplicate => "duplicate action",
        };
        f.write_str(label)
    }
}

/// Errors emitted by `ProgressStore`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ProgressError {
    #[error("sign in to save progress")]
    Unauthenticated,
    #[error("exercise {exercise} not found in lesson {lesson}")]
    ExerciseNotFound {
        lesson: LessonId,
        exercise: ExerciseId,
    },
    #[error("score {0} is outside 0..=100")]
    InvalidScore(f64),
    #[error("{0} is already being saved")]
    InFlight(String),
    #[error(transparent)]
    Catalog(#[from] CatalogError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl ProgressError {
    #[must_use]
    pub fn kind(&self) -> FailureKind {
        match self {
            ProgressError::Unauthenticated => FailureKind::Unauthenticated,
            ProgressError::ExerciseNotFound { .. } | ProgressError::Catalog(_) => {
                FailureKind::NotFound
            }
            ProgressError::InvalidScore(_) => FailureKind::InvalidState,
            ProgressError::InFlight(_) => FailureKind::Duplicate,
            ProgressError::Storage(_) => FailureKind::PersistenceFailure,
        }
    }
}

/// Errors emitted by the test session state machine and controller.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum TestSessionError {
    #[error("test has no questions")]
    Empty,
    #[error("cannot {action} while the test is {phase}")]
    InvalidTransition {
        action: &'static str,
        phase: TestPhase,
    },
    #[error(
        "revision required before retaking {}: scored {}, need {}",
        .0.test_id, .0.failed_score, .0.required_passing_score
    )]
    RevisionRequired(Box<RevisionRequirement>),
    #[error("submission already in progress")]
    SubmitInFlight,
    #[error("exercise {0} is not part of this test")]
    UnknownExercise(ExerciseId),
    #[error(transparent)]
    Evaluation(#[from] EvaluationError),
    #[error(transparent)]
    Catalog(#[from] CatalogError),
    #[error(transparent)]
    Progress(#[from] ProgressError),
}

impl TestSessionError {
    #[must_use]
    pub fn kind(&self) -> FailureKind {
        match self {
            TestSessionError::Empty
            | TestSessionError::InvalidTransition { .. }
            | TestSessionError::Evaluation(_) => FailureKind::InvalidState,
            TestSessionError::RevisionRequired(_) => FailureKind::RevisionGateViolation,
            TestSessionError::SubmitInFlight => FailureKind::Duplicate,
            TestSessionError::UnknownExercise(_) | TestSessionError::Catalog(_) => {
                FailureKind::NotFound
            }
            TestSessionError::Progress(e) => e.kind(),
        }
    }
}

/// Errors emitted by the revision flow.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum RevisionFlowError {
    #[error("no outstanding revision for test {test} in module {module}")]
    NoRequirement { module: ModuleId, test: TestId },
    #[error("revision course has no steps")]
    EmptyCourse,
    #[error("revision already completed")]
    AlreadyCompleted,
    #[error(transparent)]
    Catalog(#[from] CatalogError),
    #[error(transparent)]
    Progress(#[from] ProgressError),
}

impl RevisionFlowError {
    #[must_use]
    pub fn kind(&self) -> FailureKind {
        match self {
            RevisionFlowError::NoRequirement { .. } | RevisionFlowError::Catalog(_) => {
                FailureKind::NotFound
            }
            RevisionFlowError::EmptyCourse | RevisionFlowError::AlreadyCompleted => {
                FailureKind::InvalidState
            }
            RevisionFlowError::Progress(e) => e.kind(),
        }
    }
}

/// Errors emitted by `ExerciseService`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ExerciseError {
    #[error("exercise {exercise} not found in lesson {lesson}")]
    NotFound {
        lesson: LessonId,
        exercise: ExerciseId,
    },
    #[error(transparent)]
    Evaluation(#[from] EvaluationError),
    #[error(transparent)]
    Catalog(#[from] CatalogError),
    #[error(transparent)]
    Progress(#[from] ProgressError),
}

impl ExerciseError {
    #[must_use]
    pub fn kind(&self) -> FailureKind {
        match self {
            ExerciseError::Evaluation(_) => FailureKind::InvalidState,
            ExerciseError::NotFound { .. } | ExerciseError::Catalog(_) => FailureKind::NotFound,
            ExerciseError::Progress(e) => e.kind(),
        }
    }
}

/// Errors emitted while reading configuration.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigError {
    #[error("invalid {var} value: {raw}")]
    InvalidValue { var: &'static str, raw: String },
}

/// Errors emitted while bootstrapping app services.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AppServicesError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Catalog(#[from] CatalogError),
    #[error(transparent)]
    Sqlite(#[from] SqliteInitError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn storage_failures_are_retryable_persistence_failures() {
        let err = ProgressError::from(StorageError::Connection("down".into()));
        assert_eq!(err.kind(), FailureKind::PersistenceFailure);
        assert!(err.kind().is_retryable());
    }

    #[test]
    fn nested_progress_errors_keep_their_kind() {
        let err = TestSessionError::from(ProgressError::Unauthenticated);
        assert_eq!(err.kind(), FailureKind::Unauthenticated);
        let err = RevisionFlowError::from(ProgressError::InFlight("lesson".into()));
        assert_eq!(err.kind(), FailureKind::Duplicate);
    }

    #[test]
    fn catalog_misses_are_not_found() {
        let err = ExerciseError::from(CatalogError::ModuleNotFound("x".into()));
        assert_eq!(err.kind(), FailureKind::NotFound);
        assert!(!err.kind().is_retryable());
    }
}
