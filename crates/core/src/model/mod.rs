mod assessment;
mod exercise;
mod ids;
mod module;
mod progress;
mod revision;

pub use assessment::{Test, score_percentage};
pub use exercise::{
    ChoiceContent, ChoiceOption, CodeContent, CodeTestCase, Difficulty, Exercise, ExerciseContent,
    ExerciseType,
};
pub use ids::{ExerciseId, LessonId, ModuleId, ParseIdError, RevisionRequirementId, TestId, UserId};
pub use module::{ContentBlock, Lesson, Module};
pub use progress::{CompletionChange, ModuleOverview, ModuleProgress, TestResult};
pub use revision::{
    RevisionRequirement, RevisionStep, RevisionStepKind, default_revision_course,
};
