use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, info};

use course_core::model::{ModuleId, RevisionRequirement, RevisionStep, TestId};

use super::flow::{Advance, RevisionFlow};
use crate::error::RevisionFlowError;
use crate::progress::ProgressStore;

/// Snapshot for rendering the revision page.
#[derive(Debug, Clone, PartialEq)]
pub struct RevisionView {
    pub step_index: usize,
    pub step_count: usize,
    pub current_step: Option<RevisionStep>,
    pub progress_percent: u8,
    pub completed: bool,
}

/// Runs the remediation course that clears one revision requirement.
pub struct RevisionFlowController {
    store: Arc<ProgressStore>,
    requirement: RevisionRequirement,
    flow: Mutex<RevisionFlow>,
}

impl RevisionFlowController {
    /// Opens the course for an outstanding requirement.
    ///
    /// # Errors
    ///
    /// Returns `RevisionFlowError::NoRequirement` when nothing is outstanding
    /// for the test and `RevisionFlowError::Catalog` for unknown ids.
    pub fn begin(
        store: Arc<ProgressStore>,
        module_id: &ModuleId,
        test_id: &TestId,
    ) -> Result<Self, RevisionFlowError> {
        let test = store.catalog().test_by_id(module_id, test_id)?;
        let Some(requirement) = store.get_revision_requirement(module_id, test_id) else {
            return Err(RevisionFlowError::NoRequirement {
                module: module_id.clone(),
                test: test_id.clone(),
            });
        };
        let flow = RevisionFlow::for_test(test);
        debug!(module = %module_id, test = %test_id, steps = flow.step_count(), "revision started");
        Ok(Self {
            store,
            requirement,
            flow: Mutex::new(flow),
        })
    }

    #[must_use]
    pub fn requirement(&self) -> &RevisionRequirement {
        &self.requirement
    }

    pub async fn view(&self) -> RevisionView {
        let flow = self.flow.lock().await;
        RevisionView {
            step_index: flow.step_index(),
            step_count: flow.step_count(),
            current_step: flow.current_step().cloned(),
            progress_percent: flow.progress_percent(),
            completed: flow.is_completed(),
        }
    }

    /// Moves to the next step, or clears the requirement from the last one.
    ///
    /// The flow lock is held across the store call, so a concurrent advance
    /// waits and then sees the completed flow.
    ///
    /// # Errors
    ///
    /// Returns `RevisionFlowError::AlreadyCompleted` after completion and
    /// `RevisionFlowError::Progress` if the store rejects the update; the
    /// flow then stays on its last step.
    pub async fn advance(&self) -> Result<Advance, RevisionFlowError> {
        let mut flow = self.flow.lock().await;
        let step = flow.advance()?;
        if step != Advance::ReachedEnd {
            return Ok(step);
        }

        let cleared = self
            .store
            .mark_revision_completed(&self.requirement.module_id, &self.requirement.test_id)
            .await?;
        flow.complete();
        info!(
            module = %self.requirement.module_id,
            test = %self.requirement.test_id,
            cleared,
            "revision course finished"
        );
        Ok(Advance::ReachedEnd)
    }

    /// # Errors
    ///
    /// Returns `RevisionFlowError::AlreadyCompleted` after completion.
    pub async fn previous(&self) -> Result<usize, RevisionFlowError> {
        self.flow.lock().await.previous()
    }
}
