use serde::{Deserialize, Serialize};

use crate::model::assessment::Test;
use crate::model::exercise::Exercise;
use crate::model::ids::{ExerciseId, LessonId, ModuleId, TestId};

//
// ─── LESSON CONTENT ────────────────────────────────────────────────────────────
//

/// One block of lesson material, rendered in order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text {
        content: String,
    },
    Code {
        #[serde(default)]
        language: Option<String>,
        content: String,
    },
    Image {
        url: String,
        #[serde(default)]
        alt: Option<String>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lesson {
    pub id: LessonId,
    pub title: String,
    #[serde(default)]
    pub content: Vec<ContentBlock>,
    #[serde(default)]
    pub exercises: Vec<Exercise>,
}

impl Lesson {
    #[must_use]
    pub fn exercise(&self, id: &ExerciseId) -> Option<&Exercise> {
        self.exercises.iter().find(|e| &e.id == id)
    }
}

//
// ─── MODULE ────────────────────────────────────────────────────────────────────
//

/// Top-level catalog unit: ordered lessons plus optional tests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Module {
    pub id: ModuleId,
    pub slug: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub lessons: Vec<Lesson>,
    #[serde(default)]
    pub tests: Vec<Test>,
}

impl Module {
    #[must_use]
    pub fn lesson(&self, id: &LessonId) -> Option<&Lesson> {
        self.lessons.iter().find(|l| &l.id == id)
    }

    #[must_use]
    pub fn test(&self, id: &TestId) -> Option<&Test> {
        self.tests.iter().find(|t| &t.id == id)
    }

    /// Number of exercises across all lessons (test questions excluded).
    #[must_use]
    pub fn lesson_exercise_count(&self) -> usize {
        self.lessons.iter().map(|l| l.exercises.len()).sum()
    }
}
