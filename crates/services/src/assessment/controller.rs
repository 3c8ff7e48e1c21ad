use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use course_core::evaluation::Answer;
use course_core::model::{Exercise, ExerciseId, ModuleId, TestId, TestResult};

use super::scoring::ScoringStrategy;
use super::session::{SubmitPrompt, TestOutcome, TestPhase, TestSession, Tick};
use crate::error::TestSessionError;
use crate::events::Notice;
use crate::progress::ProgressStore;

/// Default countdown granularity.
pub const DEFAULT_TICK: Duration = Duration::from_secs(1);

/// Snapshot for rendering a test page.
#[derive(Debug, Clone, PartialEq)]
pub struct TestSessionView {
    pub phase: TestPhase,
    pub current_index: usize,
    pub current_exercise: Option<Exercise>,
    pub answered: usize,
    pub total: usize,
    pub remaining_secs: u32,
    pub outcome: Option<TestOutcome>,
    pub prior_result: Option<TestResult>,
}

struct Shared {
    store: Arc<ProgressStore>,
    scoring: Arc<dyn ScoringStrategy>,
    session: Mutex<TestSession>,
    submitting: AtomicBool,
    countdown: Mutex<Option<JoinHandle<()>>>,
}

/// Clears the in-flight flag when a submission ends, however it ends.
struct SubmitFlag<'a>(&'a AtomicBool);

impl Drop for SubmitFlag<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl Shared {
    fn session(&self) -> MutexGuard<'_, TestSession> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn stop_countdown(&self) {
        let handle = self
            .countdown
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            handle.abort();
        }
    }

    /// Scores and records the run; the session completes only after the
    /// result is stored.
    async fn submit(&self, auto_submitted: bool) -> Result<TestOutcome, TestSessionError> {
        if self.submitting.swap(true, Ordering::AcqRel) {
            return Err(TestSessionError::SubmitInFlight);
        }
        let _flag = SubmitFlag(&self.submitting);

        let (module_id, test_id, outcome) = {
            let session = self.session();
            let correct = self.scoring.grade(&session.answer_sheet());
            let outcome = session.score(correct, auto_submitted)?;
            (session.module_id().clone(), session.test().id.clone(), outcome)
        };

        self.store
            .mark_test_complete(&module_id, &test_id, outcome.score, outcome.passed)
            .await?;

        self.session().finish(outcome.clone())?;
        self.stop_countdown();
        info!(
            module = %module_id,
            test = %test_id,
            score = outcome.score,
            passed = outcome.passed,
            auto_submitted,
            "test submitted"
        );
        Ok(outcome)
    }
}

async fn run_countdown(shared: Arc<Shared>, period: Duration) {
    let mut interval = interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        interval.tick().await;
        let tick = shared.session().tick();
        match tick {
            Ok(Tick::Running { .. }) => {}
            // Expiry stays latched at zero, so a submit that was already in
            // flight is retried on the next tick if it did not complete the run.
            Ok(Tick::Expired) => match shared.submit(true).await {
                Err(TestSessionError::SubmitInFlight) => {
                    debug!("test time expired during a pending submit");
                }
                Err(err) => {
                    warn!(error = %err, "auto-submit failed");
                    return;
                }
                Ok(_) => return,
            },
            Err(_) => return,
        }
    }
}

/// Drives one test page: gating, countdown, navigation and submission.
///
/// The countdown runs as a tokio task that is aborted on completion, on a
/// restart, and when the controller is dropped.
pub struct TestSessionController {
    shared: Arc<Shared>,
    tick: Duration,
}

impl TestSessionController {
    /// Opens a test, in review if a result was already recorded.
    ///
    /// # Errors
    ///
    /// Returns `TestSessionError::Catalog` for unknown ids and
    /// `TestSessionError::Empty` for a test without questions.
    pub fn open(
        store: Arc<ProgressStore>,
        scoring: Arc<dyn ScoringStrategy>,
        module_id: &ModuleId,
        test_id: &TestId,
    ) -> Result<Self, TestSessionError> {
        let test = store.catalog().test_by_id(module_id, test_id)?.clone();
        let session = match store.get_test_result(module_id, test_id) {
            Some(prior) => TestSession::reviewing(module_id.clone(), test, prior)?,
            None => TestSession::new(module_id.clone(), test)?,
        };
        Ok(Self {
            shared: Arc::new(Shared {
                store,
                scoring,
                session: Mutex::new(session),
                submitting: AtomicBool::new(false),
                countdown: Mutex::new(None),
            }),
            tick: DEFAULT_TICK,
        })
    }

    #[must_use]
    pub fn with_tick(mut self, tick: Duration) -> Self {
        self.tick = tick;
        self
    }

    #[must_use]
    pub fn view(&self) -> TestSessionView {
        let session = self.shared.session();
        TestSessionView {
            phase: session.phase(),
            current_index: session.current_index(),
            current_exercise: session.current_exercise().cloned(),
            answered: session.answered(),
            total: session.total(),
            remaining_secs: session.remaining_secs(),
            outcome: session.outcome().cloned(),
            prior_result: session.prior_result().cloned(),
        }
    }

    #[must_use]
    pub fn phase(&self) -> TestPhase {
        self.shared.session().phase()
    }

    /// Starts or retakes the test and launches the countdown.
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns `TestSessionError::RevisionRequired` while a revision
    /// requirement for this test is outstanding, and
    /// `TestSessionError::InvalidTransition` while a run is active.
    pub async fn start(&self) -> Result<(), TestSessionError> {
        let (module_id, test_id) = {
            let session = self.shared.session();
            (session.module_id().clone(), session.test().id.clone())
        };

        if let Some(requirement) = self.shared.store.get_revision_requirement(&module_id, &test_id) {
            let err = TestSessionError::RevisionRequired(Box::new(requirement));
            info!(module = %module_id, test = %test_id, "retake blocked until revision");
            self.shared
                .store
                .events()
                .notify(Notice::new(err.kind(), err.to_string()));
            return Err(err);
        }

        self.shared.session().start(self.shared.store.clock().now())?;
        self.shared.stop_countdown();

        let handle = tokio::spawn(run_countdown(Arc::clone(&self.shared), self.tick));
        *self
            .shared
            .countdown
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(handle);
        info!(module = %module_id, test = %test_id, "test started");
        Ok(())
    }

    /// # Errors
    ///
    /// Returns `TestSessionError::InvalidTransition` outside `InProgress`.
    pub fn next(&self) -> Result<usize, TestSessionError> {
        self.shared.session().next()
    }

    /// # Errors
    ///
    /// Returns `TestSessionError::InvalidTransition` outside `InProgress`.
    pub fn prev(&self) -> Result<usize, TestSessionError> {
        self.shared.session().prev()
    }

    /// # Errors
    ///
    /// See [`TestSession::record_answer`].
    pub fn record_answer(
        &self,
        exercise_id: &ExerciseId,
        answer: Answer,
    ) -> Result<(), TestSessionError> {
        self.shared.session().record_answer(exercise_id, answer)
    }

    /// # Errors
    ///
    /// Returns `TestSessionError::InvalidTransition` outside `InProgress`.
    pub fn request_submit(&self) -> Result<SubmitPrompt, TestSessionError> {
        self.shared.session().request_submit()
    }

    /// # Errors
    ///
    /// Returns `TestSessionError::InvalidTransition` outside `ReviewPending`.
    pub fn cancel_submit(&self) -> Result<(), TestSessionError> {
        self.shared.session().cancel_submit()
    }

    /// Scores and records the run, then completes the session.
    ///
    /// On a storage failure the run stays active so the learner can retry.
    ///
    /// # Errors
    ///
    /// Returns `TestSessionError::SubmitInFlight` for a repeated submit,
    /// `TestSessionError::InvalidTransition` when no run is active and
    /// `TestSessionError::Progress` if the result cannot be recorded.
    pub async fn submit(&self) -> Result<TestOutcome, TestSessionError> {
        self.shared.submit(false).await
    }
}

impl Drop for TestSessionController {
    fn drop(&mut self) {
        self.shared.stop_countdown();
    }
}
