use history_core::gate::LaunchStatus;
use history_core::model::{EventId, QuestionBank, UserId};
use rand::Rng;
use tracing::{debug, instrument};

use super::bank::QuestionBankSelector;
use super::session::{QuizSession, SessionEvent, SessionTiming};
use crate::attempts::{AttemptLockoutService, AttemptOutcome};
use crate::Clock;
use crate::error::QuizError;

/// Result of asking to start a quiz.
#[derive(Debug)]
pub enum QuizStart {
    Ready(QuizSession),
    /// The event has no questions configured.
    NoQuizAvailable,
}

/// Orchestrates quiz start, completion and recording.
#[derive(Clone)]
pub struct QuizLoopService {
    selector: QuestionBankSelector,
    attempts: AttemptLockoutService,
    timing: SessionTiming,
    clock: Clock,
}

impl QuizLoopService {
    #[must_use]
    pub fn new(
        clock: Clock,
        selector: QuestionBankSelector,
        attempts: AttemptLockoutService,
        timing: SessionTiming,
    ) -> Self {
        Self {
            selector,
            attempts,
            timing,
            clock,
        }
    }

    /// # Errors
    ///
    /// Returns `QuizError::Progress` if progress cannot be loaded.
    pub async fn launch_status(
        &self,
        user_id: UserId,
        event_id: EventId,
    ) -> Result<LaunchStatus, QuizError> {
        Ok(self.attempts.launch_status(user_id, event_id).await?)
    }

    /// Start a quiz with questions drawn by the thread-local RNG.
    ///
    /// # Errors
    ///
    /// Returns `QuizError::Blocked` when the launch gate is closed, or
    /// storage errors while loading progress or the bank.
    pub async fn start_quiz(&self, user_id: UserId, event_id: EventId) -> Result<QuizStart, QuizError> {
        let Some(bank) = self.open_bank(user_id, event_id).await? else {
            return Ok(QuizStart::NoQuizAvailable);
        };
        let mut rng = rand::rng();
        self.build_session(&bank, &mut rng)
    }

    /// Start a quiz drawing questions from `rng`.
    ///
    /// # Errors
    ///
    /// Same as [`QuizLoopService::start_quiz`].
    pub async fn start_quiz_with_rng<R: Rng + Send + ?Sized>(
        &self,
        user_id: UserId,
        event_id: EventId,
        rng: &mut R,
    ) -> Result<QuizStart, QuizError> {
        let Some(bank) = self.open_bank(user_id, event_id).await? else {
            return Ok(QuizStart::NoQuizAvailable);
        };
        self.build_session(&bank, rng)
    }

    /// Grade and persist a completed session.
    ///
    /// # Errors
    ///
    /// Returns `QuizError::NotComplete` before completion,
    /// `QuizError::AlreadyRecorded` on a second call, or storage errors.
    #[instrument(skip(self, session), fields(event_id = %session.event_id()))]
    pub async fn finish(
        &self,
        user_id: UserId,
        session: &mut QuizSession,
    ) -> Result<AttemptOutcome, QuizError> {
        if session.is_recorded() {
            return Err(QuizError::AlreadyRecorded);
        }
        let summary = session.summary().ok_or(QuizError::NotComplete)?;
        let outcome = self.attempts.record_outcome(user_id, summary).await?;
        session.mark_recorded();
        Ok(outcome)
    }

    /// Poll the session with the service clock; records the attempt if the
    /// poll completed it.
    ///
    /// # Errors
    ///
    /// Returns storage errors from recording.
    pub async fn tick(
        &self,
        user_id: UserId,
        session: &mut QuizSession,
    ) -> Result<(SessionEvent, Option<AttemptOutcome>), QuizError> {
        if session.is_complete() && !session.is_recorded() {
            let outcome = self.finish(user_id, session).await?;
            return Ok((SessionEvent::Ignored, Some(outcome)));
        }
        let event = session.tick(self.clock.now());
        let outcome = self.record_if_completed(user_id, session, &event).await?;
        Ok((event, outcome))
    }

    /// The user dismissed the quiz. An expired session is graded, a running
    /// one is dropped without an attempt.
    ///
    /// # Errors
    ///
    /// Returns storage errors from recording.
    pub async fn close(
        &self,
        user_id: UserId,
        session: &mut QuizSession,
    ) -> Result<Option<AttemptOutcome>, QuizError> {
        if session.is_complete() && !session.is_recorded() {
            return self.finish(user_id, session).await.map(Some);
        }
        let event = session.close(self.clock.now());
        self.record_if_completed(user_id, session, &event).await
    }

    async fn record_if_completed(
        &self,
        user_id: UserId,
        session: &mut QuizSession,
        event: &SessionEvent,
    ) -> Result<Option<AttemptOutcome>, QuizError> {
        if matches!(event, SessionEvent::Completed(_)) {
            return self.finish(user_id, session).await.map(Some);
        }
        Ok(None)
    }

    async fn open_bank(
        &self,
        user_id: UserId,
        event_id: EventId,
    ) -> Result<Option<QuestionBank>, QuizError> {
        let status = self.attempts.launch_status(user_id, event_id).await?;
        if !status.can_launch() {
            debug!(%user_id, %event_id, ?status, "quiz launch blocked");
            return Err(QuizError::Blocked(status));
        }
        let bank = self.selector.fetch_bank(event_id).await?;
        if bank.is_empty() {
            debug!(%event_id, "no questions configured");
            return Ok(None);
        }
        Ok(Some(bank))
    }

    fn build_session<R: Rng + ?Sized>(
        &self,
        bank: &QuestionBank,
        rng: &mut R,
    ) -> Result<QuizStart, QuizError> {
        let policy_count = QuestionBankSelector::desired_count(self.attempts.policy(), rng);
        let questions = QuestionBankSelector::sample(bank, policy_count, rng);
        let session = QuizSession::new(bank.event_id(), questions, self.clock.now(), self.timing)?;
        Ok(QuizStart::Ready(session))
    }
}
