use serde::{Deserialize, Serialize};
use std::fmt;

use crate::model::ids::ExerciseId;

//
// ─── EXERCISE TYPE ─────────────────────────────────────────────────────────────
//

/// The four exercise flavours offered by lessons and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExerciseType {
    MultipleChoice,
    CodeCompletion,
    CodeWriting,
    Debugging,
}

impl ExerciseType {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            ExerciseType::MultipleChoice => "multiple_choice",
            ExerciseType::CodeCompletion => "code_completion",
            ExerciseType::CodeWriting => "code_writing",
            ExerciseType::Debugging => "debugging",
        }
    }

    /// True for the three types judged against a reference solution.
    #[must_use]
    pub fn is_code(self) -> bool {
        !matches!(self, ExerciseType::MultipleChoice)
    }
}

impl fmt::Display for ExerciseType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
}

//
// ─── CONTENT PAYLOADS ──────────────────────────────────────────────────────────
//

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChoiceOption {
    pub id: String,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChoiceContent {
    pub options: Vec<ChoiceOption>,
    pub correct_option: String,
    #[serde(default)]
    pub hints: Vec<String>,
}

/// Illustrative input/expected pair shown next to a code exercise. Never executed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeTestCase {
    pub input: String,
    pub expected: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeContent {
    #[serde(default)]
    pub starter_code: String,
    pub solution: String,
    #[serde(default)]
    pub hints: Vec<String>,
    #[serde(default)]
    pub test_cases: Vec<CodeTestCase>,
}

/// Type-specific payload of an exercise.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ExerciseContent {
    Choice(ChoiceContent),
    Code(CodeContent),
}

impl ExerciseContent {
    #[must_use]
    pub fn hints(&self) -> &[String] {
        match self {
            ExerciseContent::Choice(c) => &c.hints,
            ExerciseContent::Code(c) => &c.hints,
        }
    }

    /// Whether the payload shape fits the declared exercise type.
    #[must_use]
    pub fn matches(&self, kind: ExerciseType) -> bool {
        match self {
            ExerciseContent::Choice(_) => kind == ExerciseType::MultipleChoice,
            ExerciseContent::Code(_) => kind.is_code(),
        }
    }
}

//
// ─── EXERCISE ──────────────────────────────────────────────────────────────────
//

/// A gradable question. Used both inside lessons and inside tests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Exercise {
    pub id: ExerciseId,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(rename = "type")]
    pub kind: ExerciseType,
    pub difficulty: Difficulty,
    pub content: ExerciseContent,
}

impl Exercise {
    #[must_use]
    pub fn hints(&self) -> &[String] {
        self.content.hints()
    }

    /// Reference solution for code exercises, correct option id for multiple choice.
    #[must_use]
    pub fn solution(&self) -> &str {
        match &self.content {
            ExerciseContent::Choice(c) => &c.correct_option,
            ExerciseContent::Code(c) => &c.solution,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn choice_payload_deserializes_from_untagged_json() {
        let json = r#"{
            "id": "ex-1",
            "title": "Types",
            "type": "multiple_choice",
            "difficulty": "easy",
            "content": {
                "options": [{"id": "String", "text": "String"}, {"id": "Integer", "text": "Integer"}],
                "correct_option": "String"
            }
        }"#;
        let exercise: Exercise = serde_json::from_str(json).unwrap();
        assert_eq!(exercise.kind, ExerciseType::MultipleChoice);
        assert!(exercise.content.matches(exercise.kind));
        assert_eq!(exercise.solution(), "String");
        assert!(exercise.hints().is_empty());
    }

    #[test]
    fn code_payload_deserializes_with_defaults() {
        let json = r#"{
            "id": "ex-2",
            "title": "Assign",
            "type": "code_writing",
            "difficulty": "medium",
            "content": { "solution": "number = 10", "hints": ["use ="] }
        }"#;
        let exercise: Exercise = serde_json::from_str(json).unwrap();
        assert!(exercise.kind.is_code());
        assert_eq!(exercise.solution(), "number = 10");
        assert_eq!(exercise.hints(), ["use =".to_string()]);
        let ExerciseContent::Code(code) = &exercise.content else {
            panic!("expected code content");
        };
        assert!(code.starter_code.is_empty());
        assert!(code.test_cases.is_empty());
    }

    #[test]
    fn mismatched_payload_is_detected() {
        let content = ExerciseContent::Code(CodeContent {
            starter_code: String::new(),
            solution: "x".into(),
            hints: Vec::new(),
            test_cases: Vec::new(),
        });
        assert!(!content.matches(ExerciseType::MultipleChoice));
        assert!(content.matches(ExerciseType::Debugging));
    }
}
