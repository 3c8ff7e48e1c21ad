use serde::{Deserialize, Serialize};

use crate::model::exercise::Exercise;
use crate::model::ids::TestId;
use crate::model::revision::RevisionStep;

/// Timed, scored assessment attached to a module.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Test {
    pub id: TestId,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub time_limit_minutes: u32,
    /// Percentage in `0..=100` a submission must reach to pass.
    pub passing_score: u8,
    pub exercises: Vec<Exercise>,
    /// Bespoke remediation steps; the default course applies when absent.
    #[serde(default)]
    pub revision: Option<Vec<RevisionStep>>,
}

impl Test {
    #[must_use]
    pub fn time_limit_secs(&self) -> u32 {
        self.time_limit_minutes.saturating_mul(60)
    }

    #[must_use]
    pub fn is_passing(&self, score: f64) -> bool {
        score >= f64::from(self.passing_score)
    }
}

/// Percentage of `correct` out of `total`, `0.0` for an empty test.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn score_percentage(correct: usize, total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    let correct = correct.min(total);
    (correct as f64 / total as f64) * 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_with(passing_score: u8) -> Test {
        Test {
            id: TestId::new("t-1"),
            title: "Final".into(),
            description: String::new(),
            time_limit_minutes: 2,
            passing_score,
            exercises: Vec::new(),
            revision: None,
        }
    }

    #[test]
    fn passing_boundary_is_inclusive() {
        let test = test_with(70);
        assert!(test.is_passing(70.0));
        assert!(!test.is_passing(65.0));
        assert_eq!(test.time_limit_secs(), 120);
    }

    #[test]
    fn score_is_a_plain_ratio() {
        assert!((score_percentage(13, 20) - 65.0).abs() < f64::EPSILON);
        assert!((score_percentage(0, 0)).abs() < f64::EPSILON);
        assert!((score_percentage(9, 3) - 100.0).abs() < f64::EPSILON);
    }
}
