use course_core::model::{default_revision_course, RevisionStep, Test};

use crate::error::RevisionFlowError;

/// What an `advance` did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Advance {
    Moved { step_index: usize },
    /// On the last step; the caller records completion and then calls
    /// [`RevisionFlow::complete`].
    ReachedEnd,
}

/// Linear walk through a revision course.
#[derive(Debug, Clone, PartialEq)]
pub struct RevisionFlow {
    steps: Vec<RevisionStep>,
    index: usize,
    completed: bool,
}

impl RevisionFlow {
    /// # Errors
    ///
    /// Returns `RevisionFlowError::EmptyCourse` for an empty step list.
    pub fn new(steps: Vec<RevisionStep>) -> Result<Self, RevisionFlowError> {
        if steps.is_empty() {
            return Err(RevisionFlowError::EmptyCourse);
        }
        Ok(Self {
            steps,
            index: 0,
            completed: false,
        })
    }

    /// The test's own course, or the default three steps.
    #[must_use]
    pub fn for_test(test: &Test) -> Self {
        let steps = match &test.revision {
            Some(steps) if !steps.is_empty() => steps.clone(),
            _ => default_revision_course(),
        };
        Self {
            steps,
            index: 0,
            completed: false,
        }
    }

    #[must_use]
    pub fn steps(&self) -> &[RevisionStep] {
        &self.steps
    }

    #[must_use]
    pub fn step_index(&self) -> usize {
        self.index
    }

    #[must_use]
    pub fn step_count(&self) -> usize {
        self.steps.len()
    }

    #[must_use]
    pub fn current_step(&self) -> Option<&RevisionStep> {
        self.steps.get(self.index)
    }

    #[must_use]
    pub fn is_last_step(&self) -> bool {
        self.index + 1 >= self.steps.len()
    }

    #[must_use]
    pub fn is_completed(&self) -> bool {
        self.completed
    }

    /// `(step_index + 1) / step_count` as a whole percentage.
    #[must_use]
    pub fn progress_percent(&self) -> u8 {
        let count = self.steps.len().max(1);
        let pct = (self.index + 1).saturating_mul(100) / count;
        u8::try_from(pct.min(100)).unwrap_or(100)
    }

    /// Informational only; nothing waits for it.
    #[must_use]
    pub fn total_duration_minutes(&self) -> u32 {
        self.steps.iter().map(|s| s.duration_minutes).sum()
    }

    /// # Errors
    ///
    /// Returns `RevisionFlowError::AlreadyCompleted` after completion.
    pub fn advance(&mut self) -> Result<Advance, RevisionFlowError> {
        if self.completed {
            return Err(RevisionFlowError::AlreadyCompleted);
        }
        if self.is_last_step() {
            return Ok(Advance::ReachedEnd);
        }
        self.index += 1;
        Ok(Advance::Moved {
            step_index: self.index,
        })
    }

    /// # Errors
    ///
    /// Returns `RevisionFlowError::AlreadyCompleted` after completion.
    pub fn previous(&mut self) -> Result<usize, RevisionFlowError> {
        if self.completed {
            return Err(RevisionFlowError::AlreadyCompleted);
        }
        self.index = self.index.saturating_sub(1);
        Ok(self.index)
    }

    pub fn complete(&mut self) {
        self.completed = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use course_core::model::{RevisionStepKind, TestId};

    fn test_with(revision: Option<Vec<RevisionStep>>) -> Test {
        Test {
            id: TestId::new("t1"),
            title: "Quiz".into(),
            description: String::new(),
            time_limit_minutes: 5,
            passing_score: 70,
            exercises: Vec::new(),
            revision,
        }
    }

    #[test]
    fn default_course_applies_without_bespoke_steps() {
        let flow = RevisionFlow::for_test(&test_with(None));
        assert_eq!(flow.step_count(), 3);
        assert_eq!(flow.total_duration_minutes(), 30);
        assert_eq!(flow.progress_percent(), 33);

        let flow = RevisionFlow::for_test(&test_with(Some(Vec::new())));
        assert_eq!(flow.step_count(), 3);
    }

    #[test]
    fn bespoke_steps_win() {
        let step = RevisionStep {
            id: "loops".into(),
            title: "Loops again".into(),
            content: "for x in xs".into(),
            kind: RevisionStepKind::Example,
            duration_minutes: 4,
        };
        let flow = RevisionFlow::for_test(&test_with(Some(vec![step.clone()])));
        assert_eq!(flow.steps(), &[step]);
        assert!(flow.is_last_step());
        assert_eq!(flow.progress_percent(), 100);
    }

    #[test]
    fn walking_the_course_reaches_the_end_once() {
        let mut flow = RevisionFlow::new(default_revision_course()).unwrap();
        assert_eq!(flow.previous().unwrap(), 0);
        assert_eq!(flow.advance().unwrap(), Advance::Moved { step_index: 1 });
        assert_eq!(flow.advance().unwrap(), Advance::Moved { step_index: 2 });
        assert_eq!(flow.progress_percent(), 100);
        assert_eq!(flow.advance().unwrap(), Advance::ReachedEnd);

        flow.complete();
        assert!(matches!(
            flow.advance(),
            Err(RevisionFlowError::AlreadyCompleted)
        ));
    }

    #[test]
    fn empty_course_is_rejected() {
        assert!(matches!(
            RevisionFlow::new(Vec::new()),
            Err(RevisionFlowError::EmptyCourse)
        ));
    }
}
