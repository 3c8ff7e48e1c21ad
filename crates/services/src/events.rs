//! Change notifications and user-facing notices.
//!
//! Services publish onto a broadcast bus after state changes; the
//! presentation layer subscribes and re-renders. Nothing here blocks a
//! publisher when no one is listening.

use tokio::sync::broadcast;

use course_core::model::{
    ExerciseId, LessonId, ModuleId, RevisionRequirement, TestId, TestResult, UserId,
};

use crate::error::FailureKind;

const DEFAULT_CAPACITY: usize = 64;

#[derive(Debug, Clone, PartialEq)]
pub enum ProgressEvent {
    Loaded {
        user_id: UserId,
    },
    Cleared,
    LessonCompleted {
        module_id: ModuleId,
        lesson_id: LessonId,
    },
    ExerciseCompleted {
        module_id: ModuleId,
        lesson_id: LessonId,
        exercise_id: ExerciseId,
    },
    TestRecorded {
        module_id: ModuleId,
        test_id: TestId,
        result: TestResult,
    },
    RevisionRequired(RevisionRequirement),
    RevisionCleared {
        module_id: ModuleId,
        test_id: TestId,
    },
    ModuleCompleted {
        module_id: ModuleId,
    },
    ModuleReopened {
        module_id: ModuleId,
    },
}

/// A message for the user, classified by what went wrong.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub kind: FailureKind,
    pub message: String,
}

impl Notice {
    #[must_use]
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Blocking notices stop the current view; the rest are transient toasts.
    #[must_use]
    pub fn is_blocking(&self) -> bool {
        matches!(
            self.kind,
            FailureKind::Unauthenticated | FailureKind::NotFound | FailureKind::RevisionGateViolation
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum AppEvent {
    Progress(ProgressEvent),
    Notice(Notice),
}

#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<AppEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl EventBus {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<AppEvent> {
        self.tx.subscribe()
    }

    pub fn publish(&self, event: ProgressEvent) {
        // No receivers is fine.
        let _ = self.tx.send(AppEvent::Progress(event));
    }

    pub fn notify(&self, notice: Notice) {
        let _ = self.tx.send(AppEvent::Notice(notice));
    }
}
