use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::ids::{ModuleId, RevisionRequirementId, TestId};

//
// ─── REVISION STEPS ────────────────────────────────────────────────────────────
//

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RevisionStepKind {
    Concept,
    Practice,
    Example,
    Summary,
}

/// One page of a remediation course. `duration_minutes` is informational only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevisionStep {
    pub id: String,
    pub title: String,
    pub content: String,
    #[serde(rename = "type")]
    pub kind: RevisionStepKind,
    pub duration_minutes: u32,
}

impl RevisionStep {
    fn fixed(id: &str, title: &str, content: &str, kind: RevisionStepKind, minutes: u32) -> Self {
        Self {
            id: id.to_owned(),
            title: title.to_owned(),
            content: content.to_owned(),
            kind,
            duration_minutes: minutes,
        }
    }
}

/// Course used when a failed test carries no bespoke revision content.
#[must_use]
pub fn default_revision_course() -> Vec<RevisionStep> {
    vec![
        RevisionStep::fixed(
            "review-concepts",
            "Review Key Concepts",
            "Go back over the lessons this test covered and re-read the explanations \
             for every topic you were unsure about.",
            RevisionStepKind::Concept,
            10,
        ),
        RevisionStep::fixed(
            "practice-exercises",
            "Practice Exercises",
            "Work through the lesson exercises again without revealing hints or solutions.",
            RevisionStepKind::Practice,
            15,
        ),
        RevisionStep::fixed(
            "summary-review",
            "Summary Review",
            "Summarise what you learned in your own words before attempting the test again.",
            RevisionStepKind::Summary,
            5,
        ),
    ]
}

//
// ─── REVISION REQUIREMENT ──────────────────────────────────────────────────────
//

/// Gate created by a failed test attempt. Blocks retakes until cleared.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RevisionRequirement {
    pub id: RevisionRequirementId,
    pub module_id: ModuleId,
    pub test_id: TestId,
    pub failed_score: f64,
    /// Snapshot of the test's passing score when the attempt failed.
    pub required_passing_score: u8,
    pub revision_completed: bool,
    pub revision_completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl RevisionRequirement {
    #[must_use]
    pub fn outstanding(
        module_id: ModuleId,
        test_id: TestId,
        failed_score: f64,
        required_passing_score: u8,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: RevisionRequirementId::generate(),
            module_id,
            test_id,
            failed_score,
            required_passing_score,
            revision_completed: false,
            revision_completed_at: None,
            created_at,
        }
    }

    #[must_use]
    pub fn is_outstanding(&self) -> bool {
        !self.revision_completed
    }

    /// Returns a copy marked as cleared at `at`.
    #[must_use]
    pub fn cleared(&self, at: DateTime<Utc>) -> Self {
        Self {
            revision_completed: true,
            revision_completed_at: Some(at),
            ..self.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::fixed_now;

    #[test]
    fn default_course_has_three_timed_steps() {
        let steps = default_revision_course();
        let titles: Vec<_> = steps.iter().map(|s| s.title.as_str()).collect();
        assert_eq!(
            titles,
            ["Review Key Concepts", "Practice Exercises", "Summary Review"]
        );
        let minutes: Vec<_> = steps.iter().map(|s| s.duration_minutes).collect();
        assert_eq!(minutes, [10, 15, 5]);
    }

    #[test]
    fn clearing_keeps_identity_and_stamps_time() {
        let req = RevisionRequirement::outstanding(
            ModuleId::new("m"),
            TestId::new("t"),
            65.0,
            70,
            fixed_now(),
        );
        assert!(req.is_outstanding());

        let later = fixed_now() + chrono::Duration::minutes(30);
        let cleared = req.cleared(later);
        assert_eq!(cleared.id, req.id);
        assert!(!cleared.is_outstanding());
        assert_eq!(cleared.revision_completed_at, Some(later));
        assert_eq!(cleared.created_at, req.created_at);
    }
}
