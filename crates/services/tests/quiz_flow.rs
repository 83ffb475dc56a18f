use chrono::Duration;
use history_core::gate::LaunchStatus;
use history_core::lockout::AttemptVerdict;
use history_core::model::{EventId, ProgressPatch, QuestionId, QuizPolicy, QuizQuestion, UserId};
use history_core::sequencing::Curriculum;
use history_core::time::{fixed_clock, fixed_now};
use rand::SeedableRng;
use rand::rngs::StdRng;
use services::{
    AppServices, AttemptPackPurchased, PurchaseApplied, QuizError, QuizSession, QuizStart,
    SessionEvent,
};
use storage::repository::Storage;

const USER: UserId = UserId::new(7);

fn question(id: u64) -> QuizQuestion {
    QuizQuestion::new(
        QuestionId::new(id),
        format!("Which year fits event clue {id}?"),
        vec!["1789".into(), "1848".into(), "1917".into()],
        usize::try_from(id % 3).unwrap(),
        format!("Clue {id} points to a different year."),
    )
    .unwrap()
}

async fn seed(services: &AppServices, event: EventId, count: u64) {
    for id in 1..=count {
        services
            .questions()
            .store_question(event, &question(id))
            .await
            .unwrap();
    }
}

async fn start(services: &AppServices, event: EventId, seed: u64) -> QuizSession {
    let mut rng = StdRng::seed_from_u64(seed);
    match services
        .quiz_loop()
        .start_quiz_with_rng(USER, event, &mut rng)
        .await
        .unwrap()
    {
        QuizStart::Ready(session) => session,
        QuizStart::NoQuizAvailable => panic!("bank should not be empty"),
    }
}

/// Answer the first `correct` questions right and the rest wrong.
fn play(session: &mut QuizSession, correct: usize) {
    let mut now = fixed_now();
    let total = session.total_questions();
    for i in 0..total {
        let question = session.current_question().unwrap().clone();
        let choice = if i < correct {
            question.answer_index()
        } else {
            (question.answer_index() + 1) % question.options().len()
        };
        now += Duration::seconds(2);
        session.select_answer(choice, now);
        now += Duration::seconds(1);
        session.proceed(now);
    }
    assert!(session.is_complete());
}

#[tokio::test]
async fn failing_twice_locks_and_purchase_unlocks() {
    let storage = Storage::in_memory();
    let services = AppServices::new(fixed_clock(), &storage, QuizPolicy::default());
    let event = EventId::new(100);
    seed(&services, event, 5).await;

    // Reading below the gate blocks the quiz.
    services
        .progress()
        .update(USER, event, ProgressPatch::read_ratio(0.5))
        .await
        .unwrap();
    let err = services.quiz_loop().start_quiz(USER, event).await.unwrap_err();
    assert!(matches!(
        err,
        QuizError::Blocked(LaunchStatus::NeedsReading { .. })
    ));

    services.reading().record(USER, event, 0.85).await.unwrap();

    let mut first = start(&services, event, 1).await;
    assert_eq!(first.total_questions(), 5);
    play(&mut first, 1);
    let outcome = services.quiz_loop().finish(USER, &mut first).await.unwrap();
    assert_eq!(outcome.grade.score, 20);
    assert_eq!(outcome.record.failed_attempts(), 1);
    assert!(matches!(
        services.quiz_loop().finish(USER, &mut first).await,
        Err(QuizError::AlreadyRecorded)
    ));

    let mut second = start(&services, event, 2).await;
    play(&mut second, 2);
    let outcome = services.quiz_loop().finish(USER, &mut second).await.unwrap();
    assert_eq!(outcome.grade.score, 40);
    let until = fixed_now() + Duration::hours(12);
    assert_eq!(outcome.verdict, AttemptVerdict::LockedOut { until });
    assert_eq!(outcome.record.failed_attempts(), 0);
    assert_eq!(outcome.record.extra_attempts(), 0);
    assert_eq!(outcome.record.attempts().len(), 2);

    let err = services.quiz_loop().start_quiz(USER, event).await.unwrap_err();
    assert!(matches!(err, QuizError::Blocked(LaunchStatus::Locked { .. })));

    let purchase = AttemptPackPurchased::new(USER, event, 1);
    let PurchaseApplied::Granted(record) = services
        .purchases()
        .on_purchase_completed(&purchase)
        .await
        .unwrap()
    else {
        panic!("purchase should apply");
    };
    assert!(record.locked_until().is_none());
    assert_eq!(record.extra_attempts(), 1);
    assert_eq!(
        services.attempts().launch_status(USER, event).await.unwrap(),
        LaunchStatus::Open { remaining_attempts: 3 }
    );
}

#[tokio::test]
async fn lock_lifts_on_its_own_after_twelve_hours() {
    let storage = Storage::in_memory();
    let services = AppServices::new(fixed_clock(), &storage, QuizPolicy::default());
    let event = EventId::new(5);
    seed(&services, event, 6).await;
    services.reading().record(USER, event, 1.0).await.unwrap();

    for seed in 0..2 {
        let mut session = start(&services, event, seed).await;
        play(&mut session, 0);
        services.quiz_loop().finish(USER, &mut session).await.unwrap();
    }

    let mut clock = fixed_clock();
    clock.advance(Duration::hours(11));
    let waiting = AppServices::new(clock, &storage, QuizPolicy::default());
    assert!(matches!(
        waiting.quiz_loop().start_quiz(USER, event).await,
        Err(QuizError::Blocked(LaunchStatus::Locked { .. }))
    ));

    clock.advance(Duration::hours(1));
    let later = AppServices::new(clock, &storage, QuizPolicy::default());
    assert!(matches!(
        later.quiz_loop().start_quiz(USER, event).await.unwrap(),
        QuizStart::Ready(_)
    ));
}

#[tokio::test]
async fn timeout_records_an_attempt_and_early_close_does_not() {
    let storage = Storage::in_memory();
    let services = AppServices::new(fixed_clock(), &storage, QuizPolicy::default());
    let event = EventId::new(9);
    seed(&services, event, 5).await;
    services.reading().record(USER, event, 0.9).await.unwrap();

    let mut abandoned = start(&services, event, 3).await;
    assert_eq!(services.quiz_loop().close(USER, &mut abandoned).await.unwrap(), None);
    let record = services.progress().get(USER, event).await.unwrap();
    assert!(record.attempts().is_empty());

    let mut timed = start(&services, event, 4).await;
    let question = timed.current_question().unwrap().clone();
    timed.select_answer(question.answer_index(), fixed_now() + Duration::seconds(1));
    let deadline = timed.countdown().deadline();
    let SessionEvent::Completed(summary) = timed.tick(deadline) else {
        panic!("countdown should complete the session");
    };
    assert!(summary.timed_out);
    assert_eq!(summary.correct, 1);

    let outcome = services.quiz_loop().finish(USER, &mut timed).await.unwrap();
    assert!(outcome.attempt.timed_out);
    assert_eq!(outcome.attempt.total, 5);
    assert_eq!(outcome.attempt.question_ids.len(), 5);
}

#[tokio::test]
async fn empty_bank_reports_no_quiz() {
    let storage = Storage::in_memory();
    let services = AppServices::new(fixed_clock(), &storage, QuizPolicy::default());
    let event = EventId::new(11);
    services.reading().record(USER, event, 1.0).await.unwrap();
    assert!(matches!(
        services.quiz_loop().start_quiz(USER, event).await.unwrap(),
        QuizStart::NoQuizAvailable
    ));
}

#[tokio::test]
async fn curriculum_opens_events_in_order() {
    let storage = Storage::in_memory();
    let services = AppServices::new(fixed_clock(), &storage, QuizPolicy::default());
    let (a, b, c) = (EventId::new(1), EventId::new(2), EventId::new(3));
    let phase = Curriculum::new("Modern era", vec![a, b, c]).unwrap();
    seed(&services, a, 5).await;
    seed(&services, b, 5).await;

    let access = services.curriculum().access_map(USER, &phase).await.unwrap();
    assert_eq!(
        access.iter().map(|e| e.accessible).collect::<Vec<_>>(),
        vec![true, false, false]
    );

    services.reading().record(USER, a, 1.0).await.unwrap();
    let mut session = start(&services, a, 9).await;
    play(&mut session, 4);
    let outcome = services.quiz_loop().finish(USER, &mut session).await.unwrap();
    assert_eq!(outcome.grade.score, 80);
    assert!(outcome.verdict.is_pass());

    let access = services.curriculum().access_map(USER, &phase).await.unwrap();
    assert_eq!(
        access.iter().map(|e| e.accessible).collect::<Vec<_>>(),
        vec![true, true, false]
    );
    assert_eq!(access[0].best_stars, 2);
}

#[tokio::test]
async fn tick_records_a_session_that_expired_inside_an_answer() {
    let storage = Storage::in_memory();
    let services = AppServices::new(fixed_clock(), &storage, QuizPolicy::default());
    let event = EventId::new(12);
    seed(&services, event, 5).await;
    services.reading().record(USER, event, 1.0).await.unwrap();

    let mut session = start(&services, event, 5).await;
    let late = session.countdown().deadline() + Duration::seconds(1);
    assert!(matches!(
        session.select_answer(0, late),
        SessionEvent::Completed(_)
    ));
    assert!(!session.is_recorded());

    let (event_out, outcome) = services.quiz_loop().tick(USER, &mut session).await.unwrap();
    assert_eq!(event_out, SessionEvent::Ignored);
    let outcome = outcome.expect("completed session should be recorded");
    assert!(outcome.attempt.timed_out);
    assert!(session.is_recorded());

    let (_, again) = services.quiz_loop().tick(USER, &mut session).await.unwrap();
    assert!(again.is_none());
    let record = services.progress().get(USER, event).await.unwrap();
    assert_eq!(record.attempts().len(), 1);
}
