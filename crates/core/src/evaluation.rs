//! Per-exercise answer checking.
//!
//! Multiple choice compares option ids exactly. Code exercises pass when the
//! submitted text contains the reference solution verbatim; nothing is run.

use thiserror::Error;

use crate::model::{Exercise, ExerciseContent, ExerciseId, ExerciseType};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum EvaluationError {
    #[error("exercise {exercise} expects a {expected} answer")]
    AnswerMismatch {
        exercise: ExerciseId,
        expected: ExerciseType,
    },
}

/// A learner's submission for a single exercise.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Answer {
    /// Selected option id.
    Choice(String),
    /// Submitted source text.
    Code(String),
}

impl Answer {
    #[must_use]
    pub fn is_blank(&self) -> bool {
        match self {
            Answer::Choice(s) | Answer::Code(s) => s.trim().is_empty(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Correct,
    Incorrect,
}

impl Verdict {
    #[must_use]
    pub fn is_correct(self) -> bool {
        matches!(self, Verdict::Correct)
    }
}

/// Judges `answer` against `exercise`.
///
/// # Errors
///
/// Returns `EvaluationError::AnswerMismatch` when a code answer is given to a
/// multiple-choice exercise or the other way round.
pub fn evaluate(exercise: &Exercise, answer: &Answer) -> Result<Verdict, EvaluationError> {
    let correct = match (&exercise.content, answer) {
        (ExerciseContent::Choice(content), Answer::Choice(selected)) => {
            *selected == content.correct_option
        }
        (ExerciseContent::Code(content), Answer::Code(code)) => code.contains(&content.solution),
        _ => {
            return Err(EvaluationError::AnswerMismatch {
                exercise: exercise.id.clone(),
                expected: exercise.kind,
            });
        }
    };

    Ok(if correct {
        Verdict::Correct
    } else {
        Verdict::Incorrect
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ChoiceContent, ChoiceOption, CodeContent, Difficulty};

    fn choice_exercise() -> Exercise {
        Exercise {
            id: ExerciseId::new("types"),
            title: "What type is \"hi\"?".into(),
            description: String::new(),
            kind: ExerciseType::MultipleChoice,
            difficulty: Difficulty::Easy,
            content: ExerciseContent::Choice(ChoiceContent {
                options: vec![
                    ChoiceOption {
                        id: "String".into(),
                        text: "String".into(),
                    },
                    ChoiceOption {
                        id: "Integer".into(),
                        text: "Integer".into(),
                    },
                ],
                correct_option: "String".into(),
                hints: Vec::new(),
            }),
        }
    }

    fn code_exercise(kind: ExerciseType) -> Exercise {
        Exercise {
            id: ExerciseId::new("assign"),
            title: "Assign ten".into(),
            description: String::new(),
            kind,
            difficulty: Difficulty::Easy,
            content: ExerciseContent::Code(CodeContent {
                starter_code: "# assign 10 to number\n".into(),
                solution: "number = 10".into(),
                hints: Vec::new(),
                test_cases: Vec::new(),
            }),
        }
    }

    #[test]
    fn multiple_choice_requires_exact_option_id() {
        let ex = choice_exercise();
        assert_eq!(
            evaluate(&ex, &Answer::Choice("String".into())).unwrap(),
            Verdict::Correct
        );
        assert_eq!(
            evaluate(&ex, &Answer::Choice("Integer".into())).unwrap(),
            Verdict::Incorrect
        );
        assert_eq!(
            evaluate(&ex, &Answer::Choice("string".into())).unwrap(),
            Verdict::Incorrect
        );
    }

    #[test]
    fn code_answers_match_by_literal_substring() {
        for kind in [
            ExerciseType::CodeWriting,
            ExerciseType::CodeCompletion,
            ExerciseType::Debugging,
        ] {
            let ex = code_exercise(kind);
            assert!(
                evaluate(&ex, &Answer::Code("number = 10  # done".into()))
                    .unwrap()
                    .is_correct()
            );
            assert!(
                !evaluate(&ex, &Answer::Code("number=10".into()))
                    .unwrap()
                    .is_correct()
            );
        }
    }

    #[test]
    fn wrong_answer_shape_is_an_error() {
        let err = evaluate(&choice_exercise(), &Answer::Code("String".into())).unwrap_err();
        assert!(matches!(
            err,
            EvaluationError::AnswerMismatch {
                expected: ExerciseType::MultipleChoice,
                ..
            }
        ));
        assert!(evaluate(
            &code_exercise(ExerciseType::CodeWriting),
            &Answer::Choice("x".into())
        )
        .is_err());
    }
}
