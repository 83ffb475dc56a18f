use std::io::{self, BufRead, Write};
use std::path::Path;

use history_core::gate::LaunchStatus;
use history_core::lockout::AttemptVerdict;
use history_core::model::{EventId, QuestionId, QuizQuestion, UserId};
use history_core::sequencing::Curriculum;
use serde::Deserialize;
use chrono::{DateTime, Utc};
use services::{
    AppServices, AttemptOutcome, AttemptPackPurchased, QuizSession, QuizStart, SessionEvent,
};
use tokio::sync::mpsc;

type CmdResult = Result<(), Box<dyn std::error::Error>>;

#[derive(Deserialize)]
struct SeedFile {
    questions: Vec<QuizQuestion>,
}

fn demo_bank() -> Result<Vec<QuizQuestion>, history_core::Error> {
    let rows: [(&str, [&str; 4], usize, &str); 6] = [
        (
            "In which year was the Bastille stormed?",
            ["1776", "1789", "1799", "1815"],
            1,
            "The Bastille fell on 14 July 1789.",
        ),
        (
            "Which body declared itself the National Assembly in June 1789?",
            ["The nobility", "The clergy", "The Third Estate", "The Parlement of Paris"],
            2,
            "Deputies of the Third Estate took the name on 17 June 1789.",
        ),
        (
            "Which document was adopted in August 1789?",
            [
                "The Civil Code",
                "The Declaration of the Rights of Man and of the Citizen",
                "The Concordat",
                "The Edict of Nantes",
            ],
            1,
            "The Declaration was adopted on 26 August 1789.",
        ),
        (
            "Who was executed in January 1793?",
            ["Louis XVI", "Robespierre", "Danton", "Marat"],
            0,
            "Louis XVI was guillotined on 21 January 1793.",
        ),
        (
            "What ended the Reign of Terror?",
            ["The Tennis Court Oath", "The flight to Varennes", "Thermidor", "Brumaire"],
            2,
            "Robespierre fell on 9 Thermidor, year II (27 July 1794).",
        ),
        (
            "Which coup brought Napoleon Bonaparte to power?",
            ["18 Brumaire", "10 August", "9 Thermidor", "13 Vendémiaire"],
            0,
            "The coup of 18 Brumaire (9 November 1799) created the Consulate.",
        ),
    ];

    let mut questions = Vec::with_capacity(rows.len());
    for (id, (prompt, options, answer, explanation)) in (1_u64..).zip(rows) {
        let options = options.iter().map(|o| (*o).to_string()).collect();
        questions.push(QuizQuestion::new(
            QuestionId::new(id),
            prompt,
            options,
            answer,
            explanation,
        )?);
    }
    Ok(questions)
}

pub async fn seed(services: &AppServices, event: EventId, file: Option<&Path>) -> CmdResult {
    let questions = match file {
        Some(path) => toml::from_str::<SeedFile>(&std::fs::read_to_string(path)?)?.questions,
        None => demo_bank()?,
    };
    let count = questions.len();
    for question in &questions {
        services.questions().store_question(event, question).await?;
    }
    println!("Stored {count} questions for event {event}.");
    Ok(())
}

fn describe_status(status: &LaunchStatus) -> String {
    match status {
        LaunchStatus::Open { remaining_attempts } => {
            format!("quiz open ({remaining_attempts} attempts before lockout)")
        }
        LaunchStatus::NeedsReading { read_ratio, required } => format!(
            "keep reading: {:.0}% of {:.0}% required",
            read_ratio * 100.0,
            required * 100.0
        ),
        LaunchStatus::Locked {
            until,
            purchase_available,
        } => {
            let mut line = format!("locked until {}", until.to_rfc3339());
            if *purchase_available {
                line.push_str(" (an attempt pack unlocks it now)");
            }
            line
        }
    }
}

pub async fn status(services: &AppServices, user: UserId, event: EventId) -> CmdResult {
    let record = services.progress().get(user, event).await?;
    let launch = services.attempts().launch_status(user, event).await?;

    println!("Event {event}");
    println!("  read: {:.0}%", record.read_ratio() * 100.0);
    if let Some(at) = record.completed_at() {
        println!("  dossier completed: {}", at.to_rfc3339());
    }
    println!(
        "  attempts: {}  best: {}% ({} stars)",
        record.attempts().len(),
        record.best_score(),
        record.best_stars()
    );
    println!(
        "  failed in a row: {}  extra attempts: {}",
        record.failed_attempts(),
        record.extra_attempts()
    );
    println!("  {}", describe_status(&launch));
    Ok(())
}

pub async fn read(services: &AppServices, user: UserId, event: EventId, ratio: f64) -> CmdResult {
    match services.reading().record(user, event, ratio).await? {
        Some(record) => println!("Read progress now {:.0}%.", record.read_ratio() * 100.0),
        None => println!("No change recorded."),
    }
    Ok(())
}

fn print_outcome(outcome: &AttemptOutcome) {
    println!(
        "Score {}% ({} stars), attempt #{}.",
        outcome.grade.score, outcome.grade.stars, outcome.attempt.attempt_number
    );
    match outcome.verdict {
        AttemptVerdict::Passed => println!("Passed."),
        AttemptVerdict::Failed { remaining, .. } => {
            println!("Not passed. {remaining} attempts left before lockout.");
        }
        AttemptVerdict::LockedOut { until } => {
            println!("Not passed. Quiz locked until {}.", until.to_rfc3339());
        }
    }
}

/// Leave the "correct" screen once the auto-advance delay has been waited out.
///
/// A frozen `--now` clock never reaches the advance instant, so fall back to
/// an explicit continue when the poll does nothing.
fn advance_after_correct(session: &mut QuizSession, now: DateTime<Utc>) -> SessionEvent {
    match session.tick(now) {
        SessionEvent::Ignored => session.proceed(now),
        event => event,
    }
}

pub async fn quiz(services: &AppServices, user: UserId, event: EventId) -> CmdResult {
    let quiz_loop = services.quiz_loop();
    let mut session = match quiz_loop.start_quiz(user, event).await? {
        QuizStart::Ready(session) => session,
        QuizStart::NoQuizAvailable => {
            println!("No quiz is configured for event {event} yet.");
            return Ok(());
        }
    };
    let clock = services.progress().clock();
    let stdin = io::stdin();
    let mut lines = stdin.lock().lines();

    println!(
        "{} questions, {} seconds in total. Type an option number, or q to quit.",
        session.total_questions(),
        session.countdown().limit().num_seconds()
    );

    while !session.is_finished() {
        let Some(question) = session.current_question().cloned() else {
            break;
        };
        println!();
        println!(
            "[{}/{}] {}  ({}s left)",
            session.current_index() + 1,
            session.total_questions(),
            question.prompt(),
            session.remaining(clock.now()).num_seconds()
        );
        for (idx, option) in question.options().iter().enumerate() {
            println!("  {}. {option}", idx + 1);
        }
        print!("> ");
        io::stdout().flush()?;

        let Some(line) = lines.next().transpose()? else {
            session.close(clock.now());
            break;
        };
        let line = line.trim();
        if line.eq_ignore_ascii_case("q") {
            session.close(clock.now());
            break;
        }
        let Some(choice) = line.parse::<usize>().ok().and_then(|n| n.checked_sub(1)) else {
            println!("Please type a number between 1 and {}.", question.options().len());
            continue;
        };

        match session.select_answer(choice, clock.now()) {
            SessionEvent::Correct { .. } => {
                println!("Correct!");
                let delay = services.policy().auto_advance_delay();
                if let Ok(delay) = delay.to_std() {
                    tokio::time::sleep(delay).await;
                }
                advance_after_correct(&mut session, clock.now());
            }
            SessionEvent::Incorrect {
                answer_index,
                explanation,
                ..
            } => {
                println!("Not quite. The answer was {}.", answer_index + 1);
                if !explanation.is_empty() {
                    println!("{explanation}");
                }
                print!("Press Enter to continue.");
                io::stdout().flush()?;
                let _ = lines.next().transpose()?;
                session.proceed(clock.now());
            }
            SessionEvent::Completed(_) => println!("Time is up."),
            _ => println!("Please type a number between 1 and {}.", question.options().len()),
        }
    }

    println!();
    if session.is_complete() {
        let outcome = quiz_loop.finish(user, &mut session).await?;
        print_outcome(&outcome);
    } else {
        println!("Quiz closed; no attempt recorded.");
    }
    Ok(())
}

pub async fn purchase(
    services: &AppServices,
    user: UserId,
    event: EventId,
    quantity: u32,
) -> CmdResult {
    let bridge = services.purchases();
    let (tx, rx) = mpsc::channel(4);
    let listener = tokio::spawn(async move { bridge.listen(rx).await });

    tx.send(AttemptPackPurchased::new(user, event, quantity)).await?;
    drop(tx);

    if listener.await? == 1 {
        println!("Added {quantity} attempts to event {event}.");
    } else {
        println!("Purchase was not applied.");
    }
    let launch = services.attempts().launch_status(user, event).await?;
    println!("{}", describe_status(&launch));
    Ok(())
}

pub async fn curriculum(
    services: &AppServices,
    user: UserId,
    phase: String,
    events: Vec<EventId>,
) -> CmdResult {
    let curriculum = Curriculum::new(phase, events)?;
    let access = services.curriculum().access_map(user, &curriculum).await?;

    println!("{}", curriculum.phase());
    for entry in access {
        let state = match (entry.accessible, entry.passed) {
            (_, true) => "passed",
            (true, false) => "open",
            (false, false) => "locked",
        };
        println!(
            "  {}. event {:<6} {:<7} best {}% {}",
            entry.position + 1,
            entry.event_id.value(),
            state,
            entry.best_score,
            "*".repeat(usize::from(entry.best_stars))
        );
    }
    Ok(())
}
