mod controller;
mod scoring;
mod session;

pub use crate::error::TestSessionError;
pub use controller::{TestSessionController, TestSessionView, DEFAULT_TICK};
pub use scoring::{
    AnswerSheet, AnsweredScoring, EvaluatedScoring, FixedScoring, RandomScoring, ScoringStrategy,
};
pub use session::{SubmitPrompt, TestOutcome, TestPhase, TestSession, Tick};
