#![forbid(unsafe_code)]

pub mod app_services;
pub mod assessment;
pub mod auth;
pub mod config;
pub mod error;
pub mod events;
pub mod exercise_service;
pub mod progress;
pub mod revision;

pub use course_core::Clock;

pub use app_services::{bundled_catalog, AppServices};
pub use auth::{AuthProvider, SessionAuth};
pub use config::{AppConfig, ScoringMode};
pub use error::{
    AppServicesError, ConfigError, ExerciseError, FailureKind, ProgressError, RevisionFlowError,
    TestSessionError,
};
pub use events::{AppEvent, EventBus, Notice, ProgressEvent};
pub use exercise_service::{ExerciseService, ExerciseWorkspace};
pub use progress::ProgressStore;

pub use assessment::{
    AnsweredScoring, EvaluatedScoring, FixedScoring, RandomScoring, ScoringStrategy, TestOutcome,
    TestPhase, TestSessionController, TestSessionView,
};
pub use revision::{Advance, RevisionFlowController, RevisionView};
