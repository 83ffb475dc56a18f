use chrono::{DateTime, Duration, Utc};
use history_core::model::{EventId, QuestionId, QuizPolicy, QuizQuestion};
use history_core::time::Countdown;

use crate::error::SessionError;

//
// ─── TIMING ────────────────────────────────────────────────────────────────────
//

/// Session-wide timing knobs taken from the policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionTiming {
    pub default_time_per_question: Duration,
    pub auto_advance_delay: Duration,
}

impl SessionTiming {
    #[must_use]
    pub fn from_policy(policy: &QuizPolicy) -> Self {
        Self {
            default_time_per_question: policy.default_time_per_question(),
            auto_advance_delay: policy.auto_advance_delay(),
        }
    }
}

impl Default for SessionTiming {
    fn default() -> Self {
        Self::from_policy(&QuizPolicy::default())
    }
}

//
// ─── ANSWERS AND SUMMARY ───────────────────────────────────────────────────────
//

/// One question's outcome. Unanswered questions keep `selected_index: None`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnswerRecord {
    pub question_id: QuestionId,
    pub selected_index: Option<usize>,
    pub is_correct: bool,
    pub answered_at: Option<DateTime<Utc>>,
}

impl AnswerRecord {
    fn unanswered(question_id: QuestionId) -> Self {
        Self {
            question_id,
            selected_index: None,
            is_correct: false,
            answered_at: None,
        }
    }

    #[must_use]
    pub fn is_answered(&self) -> bool {
        self.selected_index.is_some()
    }
}

/// Final tally of a completed session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuizSummary {
    pub event_id: EventId,
    pub correct: u32,
    pub total: u32,
    pub answers: Vec<AnswerRecord>,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub elapsed: Duration,
    pub timed_out: bool,
}

impl QuizSummary {
    #[must_use]
    pub fn question_ids(&self) -> Vec<QuestionId> {
        self.answers.iter().map(|a| a.question_id).collect()
    }
}

//
// ─── STATE MACHINE ─────────────────────────────────────────────────────────────
//

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuizPhase {
    /// Waiting for an answer to the current question.
    Answering,
    /// Answered correctly; moves on by itself at `advance_at`.
    AwaitingAdvance { advance_at: DateTime<Utc> },
    /// Answered incorrectly; the explanation is showing until the user continues.
    Revealed,
    Completed,
    Abandoned,
}

impl QuizPhase {
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, QuizPhase::Completed | QuizPhase::Abandoned)
    }
}

/// What a transition produced. Transitions that do not apply yield `Ignored`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    Ignored,
    Correct {
        question_id: QuestionId,
    },
    Incorrect {
        question_id: QuestionId,
        answer_index: usize,
        explanation: String,
    },
    Advanced {
        index: usize,
    },
    Completed(QuizSummary),
    Abandoned,
}

/// One quiz run over a fixed list of questions, sharing a single countdown.
///
/// The session never reads the clock itself; callers pass `now` into every
/// transition, and `tick` is the polling hook for the countdown and the
/// auto-advance delay.
#[derive(Debug, Clone)]
pub struct QuizSession {
    event_id: EventId,
    questions: Vec<QuizQuestion>,
    answers: Vec<AnswerRecord>,
    current: usize,
    phase: QuizPhase,
    countdown: Countdown,
    auto_advance_delay: Duration,
    summary: Option<QuizSummary>,
    recorded: bool,
}

impl QuizSession {
    /// Start a session. The countdown limit is the sum of each question's
    /// time, falling back to the default for questions that set none.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Empty` if `questions` is empty.
    pub fn new(
        event_id: EventId,
        questions: Vec<QuizQuestion>,
        started_at: DateTime<Utc>,
        timing: SessionTiming,
    ) -> Result<Self, SessionError> {
        if questions.is_empty() {
            return Err(SessionError::Empty);
        }
        let limit = questions
            .iter()
            .map(|q| {
                q.time_per_question_secs()
                    .map_or(timing.default_time_per_question, |secs| {
                        Duration::seconds(i64::from(secs))
                    })
            })
            .fold(Duration::zero(), |acc, d| acc + d);
        let answers = questions
            .iter()
            .map(|q| AnswerRecord::unanswered(q.id()))
            .collect();

        Ok(Self {
            event_id,
            questions,
            answers,
            current: 0,
            phase: QuizPhase::Answering,
            countdown: Countdown::new(started_at, limit),
            auto_advance_delay: timing.auto_advance_delay,
            summary: None,
            recorded: false,
        })
    }

    #[must_use]
    pub fn event_id(&self) -> EventId {
        self.event_id
    }

    #[must_use]
    pub fn phase(&self) -> QuizPhase {
        self.phase
    }

    #[must_use]
    pub fn countdown(&self) -> Countdown {
        self.countdown
    }

    #[must_use]
    pub fn remaining(&self, now: DateTime<Utc>) -> Duration {
        self.countdown.remaining(now)
    }

    #[must_use]
    pub fn total_questions(&self) -> usize {
        self.questions.len()
    }

    #[must_use]
    pub fn current_index(&self) -> usize {
        self.current
    }

    #[must_use]
    pub fn questions(&self) -> &[QuizQuestion] {
        &self.questions
    }

    /// The question on screen; `None` once the session has ended.
    #[must_use]
    pub fn current_question(&self) -> Option<&QuizQuestion> {
        if self.phase.is_terminal() {
            return None;
        }
        self.questions.get(self.current)
    }

    #[must_use]
    pub fn answers(&self) -> &[AnswerRecord] {
        &self.answers
    }

    #[must_use]
    pub fn correct_count(&self) -> u32 {
        count_u32(self.answers.iter().filter(|a| a.is_correct).count())
    }

    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.phase == QuizPhase::Completed
    }

    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.phase.is_terminal()
    }

    /// The summary, once the session has completed.
    #[must_use]
    pub fn summary(&self) -> Option<&QuizSummary> {
        self.summary.as_ref()
    }

    #[must_use]
    pub fn is_recorded(&self) -> bool {
        self.recorded
    }

    pub(crate) fn mark_recorded(&mut self) {
        self.recorded = true;
    }

    /// Choose an option for the current question.
    ///
    /// Ignored unless the session is waiting for an answer and the index is
    /// in range; a question can be answered once.
    pub fn select_answer(&mut self, option_index: usize, now: DateTime<Utc>) -> SessionEvent {
        if let Some(event) = self.expire_if_due(now) {
            return event;
        }
        if self.phase != QuizPhase::Answering {
            return SessionEvent::Ignored;
        }
        let Some(question) = self.questions.get(self.current) else {
            return SessionEvent::Ignored;
        };
        if option_index >= question.options().len() {
            return SessionEvent::Ignored;
        }
        let answer = &mut self.answers[self.current];
        if answer.is_answered() {
            return SessionEvent::Ignored;
        }

        let is_correct = question.is_correct(option_index);
        answer.selected_index = Some(option_index);
        answer.is_correct = is_correct;
        answer.answered_at = Some(now);

        if is_correct {
            self.phase = QuizPhase::AwaitingAdvance {
                advance_at: now + self.auto_advance_delay,
            };
            SessionEvent::Correct {
                question_id: question.id(),
            }
        } else {
            self.phase = QuizPhase::Revealed;
            SessionEvent::Incorrect {
                question_id: question.id(),
                answer_index: question.answer_index(),
                explanation: question.explanation().to_string(),
            }
        }
    }

    /// Move past an answered question without waiting for auto-advance.
    pub fn proceed(&mut self, now: DateTime<Utc>) -> SessionEvent {
        if let Some(event) = self.expire_if_due(now) {
            return event;
        }
        match self.phase {
            QuizPhase::Revealed | QuizPhase::AwaitingAdvance { .. } => self.advance(now),
            _ => SessionEvent::Ignored,
        }
    }

    /// Poll the countdown and the auto-advance delay.
    pub fn tick(&mut self, now: DateTime<Utc>) -> SessionEvent {
        if let Some(event) = self.expire_if_due(now) {
            return event;
        }
        match self.phase {
            QuizPhase::AwaitingAdvance { advance_at } if now >= advance_at => self.advance(now),
            _ => SessionEvent::Ignored,
        }
    }

    /// End the session now. Unanswered questions count as incorrect.
    pub fn force_complete(&mut self, now: DateTime<Utc>) -> SessionEvent {
        if self.phase.is_terminal() {
            return SessionEvent::Ignored;
        }
        let timed_out = self.countdown.is_expired(now);
        self.complete(now, timed_out)
    }

    /// Leave without grading. Returns `false` if the session had already ended.
    pub fn abandon(&mut self) -> bool {
        if self.phase.is_terminal() {
            return false;
        }
        self.phase = QuizPhase::Abandoned;
        true
    }

    /// The user dismissed the quiz.
    ///
    /// Completes if the countdown already ran out, otherwise abandons.
    pub fn close(&mut self, now: DateTime<Utc>) -> SessionEvent {
        if let Some(event) = self.expire_if_due(now) {
            return event;
        }
        if self.abandon() {
            SessionEvent::Abandoned
        } else {
            SessionEvent::Ignored
        }
    }

    fn expire_if_due(&mut self, now: DateTime<Utc>) -> Option<SessionEvent> {
        if !self.phase.is_terminal() && self.countdown.is_expired(now) {
            Some(self.complete(now, true))
        } else {
            None
        }
    }

    fn advance(&mut self, now: DateTime<Utc>) -> SessionEvent {
        self.current += 1;
        if self.current >= self.questions.len() {
            return self.complete(now, false);
        }
        self.phase = QuizPhase::Answering;
        SessionEvent::Advanced {
            index: self.current,
        }
    }

    fn complete(&mut self, now: DateTime<Utc>, timed_out: bool) -> SessionEvent {
        self.phase = QuizPhase::Completed;
        let elapsed = if timed_out {
            self.countdown.limit()
        } else {
            self.countdown.elapsed(now)
        };
        let summary = QuizSummary {
            event_id: self.event_id,
            correct: self.correct_count(),
            total: count_u32(self.questions.len()),
            answers: self.answers.clone(),
            started_at: self.countdown.started_at(),
            completed_at: now,
            elapsed,
            timed_out,
        };
        self.summary = Some(summary.clone());
        SessionEvent::Completed(summary)
    }
}

fn count_u32(n: usize) -> u32 {
    u32::try_from(n).unwrap_or(u32::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use history_core::time::fixed_now;

    fn question(id: u64, answer: usize) -> QuizQuestion {
        QuizQuestion::new(
            QuestionId::new(id),
            format!("Q{id}"),
            vec!["a".into(), "b".into(), "c".into()],
            answer,
            format!("because {id}"),
        )
        .unwrap()
    }

    fn session(n: u64) -> QuizSession {
        let questions = (1..=n).map(|id| question(id, 0)).collect();
        QuizSession::new(EventId::new(9), questions, fixed_now(), SessionTiming::default()).unwrap()
    }

    fn secs(n: i64) -> Duration {
        Duration::seconds(n)
    }

    #[test]
    fn empty_question_list_is_rejected() {
        let err = QuizSession::new(EventId::new(1), vec![], fixed_now(), SessionTiming::default())
            .unwrap_err();
        assert_eq!(err, SessionError::Empty);
    }

    #[test]
    fn countdown_limit_sums_per_question_times() {
        let questions = vec![
            question(1, 0),
            question(2, 0).with_time_per_question(10).unwrap(),
        ];
        let s = QuizSession::new(EventId::new(1), questions, fixed_now(), SessionTiming::default())
            .unwrap();
        assert_eq!(s.countdown().limit(), secs(40));
    }

    #[test]
    fn correct_answer_auto_advances_after_delay() {
        let mut s = session(2);
        let t0 = fixed_now();
        assert!(matches!(s.select_answer(0, t0), SessionEvent::Correct { .. }));
        assert!(matches!(s.phase(), QuizPhase::AwaitingAdvance { .. }));

        assert_eq!(s.tick(t0 + Duration::milliseconds(1_000)), SessionEvent::Ignored);
        assert_eq!(
            s.tick(t0 + Duration::milliseconds(1_200)),
            SessionEvent::Advanced { index: 1 }
        );
        assert_eq!(s.phase(), QuizPhase::Answering);
    }

    #[test]
    fn incorrect_answer_reveals_until_proceed() {
        let mut s = session(2);
        let t0 = fixed_now();
        match s.select_answer(2, t0) {
            SessionEvent::Incorrect {
                answer_index,
                explanation,
                ..
            } => {
                assert_eq!(answer_index, 0);
                assert_eq!(explanation, "because 1");
            }
            other => panic!("unexpected {other:?}"),
        }
        // No auto-advance from the reveal.
        assert_eq!(s.tick(t0 + secs(5)), SessionEvent::Ignored);
        assert_eq!(s.proceed(t0 + secs(5)), SessionEvent::Advanced { index: 1 });
    }

    #[test]
    fn second_answer_and_out_of_range_are_ignored() {
        let mut s = session(2);
        let t0 = fixed_now();
        assert_eq!(s.select_answer(7, t0), SessionEvent::Ignored);
        assert!(matches!(s.select_answer(1, t0), SessionEvent::Incorrect { .. }));
        assert_eq!(s.select_answer(0, t0), SessionEvent::Ignored);
        assert_eq!(s.answers()[0].selected_index, Some(1));
    }

    #[test]
    fn proceed_before_answering_is_ignored() {
        let mut s = session(1);
        assert_eq!(s.proceed(fixed_now()), SessionEvent::Ignored);
    }

    #[test]
    fn finishing_every_question_completes_once() {
        let mut s = session(2);
        let t0 = fixed_now();
        s.select_answer(0, t0);
        s.proceed(t0 + secs(1));
        s.select_answer(1, t0 + secs(2));
        let SessionEvent::Completed(summary) = s.proceed(t0 + secs(3)) else {
            panic!("expected completion");
        };
        assert_eq!(summary.correct, 1);
        assert_eq!(summary.total, 2);
        assert!(!summary.timed_out);
        assert_eq!(summary.elapsed, secs(3));
        assert_eq!(summary.question_ids(), vec![QuestionId::new(1), QuestionId::new(2)]);

        assert_eq!(s.proceed(t0 + secs(4)), SessionEvent::Ignored);
        assert_eq!(s.tick(t0 + secs(400)), SessionEvent::Ignored);
        assert_eq!(s.force_complete(t0 + secs(400)), SessionEvent::Ignored);
        assert!(!s.abandon());
        assert!(s.current_question().is_none());
    }

    #[test]
    fn expiry_completes_with_unanswered_marked_incorrect() {
        let mut s = session(3);
        let t0 = fixed_now();
        s.select_answer(0, t0);
        s.proceed(t0 + secs(1));

        let SessionEvent::Completed(summary) = s.tick(t0 + secs(90)) else {
            panic!("expected timeout completion");
        };
        assert!(summary.timed_out);
        assert_eq!(summary.correct, 1);
        assert_eq!(summary.total, 3);
        assert_eq!(summary.elapsed, secs(90));
        assert!(summary.answers[1..].iter().all(|a| !a.is_answered() && !a.is_correct));
    }

    #[test]
    fn late_answer_after_expiry_completes_instead() {
        let mut s = session(1);
        let event = s.select_answer(0, fixed_now() + secs(31));
        let SessionEvent::Completed(summary) = event else {
            panic!("expected completion");
        };
        assert_eq!(summary.correct, 0);
        assert!(summary.timed_out);
    }

    #[test]
    fn close_abandons_a_running_session() {
        let mut s = session(2);
        assert_eq!(s.close(fixed_now() + secs(5)), SessionEvent::Abandoned);
        assert_eq!(s.phase(), QuizPhase::Abandoned);
        assert!(s.summary().is_none());
        assert_eq!(s.select_answer(0, fixed_now() + secs(6)), SessionEvent::Ignored);
    }

    #[test]
    fn close_after_expiry_completes() {
        let mut s = session(1);
        assert!(matches!(s.close(fixed_now() + secs(60)), SessionEvent::Completed(_)));
        assert!(s.summary().is_some());
    }

    #[test]
    fn force_complete_before_expiry_is_not_a_timeout() {
        let mut s = session(2);
        let SessionEvent::Completed(summary) = s.force_complete(fixed_now() + secs(10)) else {
            panic!("expected completion");
        };
        assert!(!summary.timed_out);
        assert_eq!(summary.correct, 0);
    }
}
