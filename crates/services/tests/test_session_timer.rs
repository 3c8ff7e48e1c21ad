mod common;

use std::sync::Arc;
use std::time::Duration;

use course_core::evaluation::Answer;
use course_core::model::{ExerciseId, ModuleId, TestId};
use services::{
    AnsweredScoring, EvaluatedScoring, FailureKind, FixedScoring, TestPhase, TestSessionError,
};

use common::signed_in;

fn basics() -> ModuleId {
    ModuleId::new("python-basics")
}

fn basics_test() -> TestId {
    TestId::new("basics-test")
}

#[tokio::test(start_paused = true)]
async fn unanswered_test_auto_submits_when_time_runs_out() {
    let (services, _repo, _auth) = signed_in();
    let services = services.with_scoring(Arc::new(AnsweredScoring));
    let session = services.open_test(&basics(), &basics_test()).unwrap();

    session.start().await.unwrap();
    assert_eq!(session.view().remaining_secs, 60);

    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(session.phase(), TestPhase::InProgress);
    assert!(session.view().remaining_secs <= 31);

    tokio::time::sleep(Duration::from_secs(31)).await;
    let view = session.view();
    assert_eq!(view.phase, TestPhase::Completed);
    let outcome = view.outcome.expect("auto-submitted outcome");
    assert!(outcome.auto_submitted);
    assert_eq!(outcome.time_spent_secs, 60);
    assert_eq!(outcome.correct, 0);
    assert!(!outcome.passed);

    assert!(services
        .progress()
        .has_revision_requirement(&basics(), &basics_test()));
}

#[tokio::test(start_paused = true)]
async fn countdown_keeps_running_while_confirming() {
    let (services, _repo, _auth) = signed_in();
    let services = services.with_scoring(Arc::new(FixedScoring(3)));
    let session = services.open_test(&basics(), &basics_test()).unwrap();
    session.start().await.unwrap();

    let prompt = session.request_submit().unwrap();
    assert_eq!((prompt.answered, prompt.total), (0, 3));

    tokio::time::sleep(Duration::from_secs(61)).await;
    let view = session.view();
    assert_eq!(view.phase, TestPhase::Completed);
    assert!(view.outcome.unwrap().passed);
}

#[tokio::test(start_paused = true)]
async fn manual_submit_stops_the_countdown() {
    let (services, _repo, _auth) = signed_in();
    let services = services.with_scoring(Arc::new(EvaluatedScoring));
    let session = services.open_test(&basics(), &basics_test()).unwrap();
    session.start().await.unwrap();

    session
        .record_answer(&ExerciseId::new("q-string"), Answer::Choice("String".into()))
        .unwrap();
    session.next().unwrap();
    session
        .record_answer(&ExerciseId::new("q-int"), Answer::Choice("Integer".into()))
        .unwrap();
    session.next().unwrap();
    session
        .record_answer(&ExerciseId::new("q-assign"), Answer::Code("total = 3\n".into()))
        .unwrap();
    assert_eq!(session.next().unwrap(), 2);

    tokio::time::sleep(Duration::from_millis(20_500)).await;
    session.request_submit().unwrap();
    session.cancel_submit().unwrap();
    let outcome = session.submit().await.unwrap();
    assert_eq!(outcome.correct, 3);
    assert!(outcome.passed);
    assert!(!outcome.auto_submitted);
    assert_eq!(outcome.time_spent_secs, 20);

    tokio::time::sleep(Duration::from_secs(120)).await;
    let view = session.view();
    assert_eq!(view.remaining_secs, 40);
    assert_eq!(view.outcome.unwrap().time_spent_secs, 20);

    let err = session.submit().await.unwrap_err();
    assert!(matches!(err, TestSessionError::InvalidTransition { .. }));
    assert!(services
        .progress()
        .get_test_result(&basics(), &basics_test())
        .is_some_and(|r| r.passed));
}

#[tokio::test(start_paused = true)]
async fn faster_ticks_come_from_configuration() {
    let (services, _repo, _auth) = signed_in();
    let services = services
        .with_scoring(Arc::new(FixedScoring(0)))
        .with_countdown_tick(Duration::from_millis(10));
    let session = services.open_test(&basics(), &basics_test()).unwrap();
    session.start().await.unwrap();

    tokio::time::sleep(Duration::from_millis(605)).await;
    let outcome = session.view().outcome.expect("expired");
    assert_eq!(outcome.time_spent_secs, 60);
}

#[tokio::test(start_paused = true)]
async fn second_start_leaves_the_running_countdown_alone() {
    let (services, _repo, _auth) = signed_in();
    let services = services.with_scoring(Arc::new(FixedScoring(0)));
    let session = services.open_test(&basics(), &basics_test()).unwrap();
    session.start().await.unwrap();

    tokio::time::sleep(Duration::from_millis(10_500)).await;
    let err = session.start().await.unwrap_err();
    assert!(matches!(
        err,
        TestSessionError::InvalidTransition {
            phase: TestPhase::InProgress,
            ..
        }
    ));
    assert_eq!(session.view().remaining_secs, 50);

    tokio::time::sleep(Duration::from_secs(120)).await;
    let view = session.view();
    assert_eq!(view.phase, TestPhase::Completed);
    let outcome = view.outcome.expect("auto-submitted outcome");
    assert!(outcome.auto_submitted);
    assert_eq!(outcome.time_spent_secs, 60);
}

#[tokio::test(start_paused = true)]
async fn expiry_during_a_failing_submit_still_auto_submits() {
    let (services, repo, _auth) = signed_in();
    let services = services.with_scoring(Arc::new(FixedScoring(3)));
    let session = Arc::new(services.open_test(&basics(), &basics_test()).unwrap());
    session.start().await.unwrap();

    tokio::time::sleep(Duration::from_millis(59_500)).await;
    assert_eq!(session.view().remaining_secs, 1);

    let held = repo.hold_test_writes().await;
    let manual = tokio::spawn({
        let session = Arc::clone(&session);
        async move { session.submit().await }
    });
    for _ in 0..4 {
        tokio::task::yield_now().await;
    }

    let err = session.submit().await.unwrap_err();
    assert!(matches!(err, TestSessionError::SubmitInFlight));
    assert_eq!(err.kind(), FailureKind::Duplicate);

    repo.set_failing(true);
    tokio::time::sleep(Duration::from_secs(1)).await;
    let view = session.view();
    assert_eq!(view.phase, TestPhase::InProgress);
    assert_eq!(view.remaining_secs, 0);

    drop(held);
    let err = manual.await.unwrap().unwrap_err();
    assert_eq!(err.kind(), FailureKind::PersistenceFailure);
    assert_eq!(session.phase(), TestPhase::InProgress);

    repo.set_failing(false);
    tokio::time::sleep(Duration::from_secs(1)).await;
    let view = session.view();
    assert_eq!(view.phase, TestPhase::Completed);
    let outcome = view.outcome.expect("auto-submitted outcome");
    assert!(outcome.auto_submitted);
    assert_eq!(outcome.time_spent_secs, 60);
    assert!(services
        .progress()
        .get_test_result(&basics(), &basics_test())
        .is_some_and(|r| r.passed));
}
