use history_core::gate::{self, LaunchStatus};
use history_core::grading::{self, Grade};
use history_core::lockout::{self, AttemptVerdict};
use history_core::model::{AttemptDraft, AttemptRecord, EventId, ProgressRecord, QuizPolicy, UserId};
use tracing::{info, instrument};

use crate::error::ProgressError;
use crate::progress_store::ProgressStore;
use crate::quiz::QuizSummary;

/// Everything recording one attempt produced.
#[derive(Debug, Clone, PartialEq)]
pub struct AttemptOutcome {
    pub grade: Grade,
    pub attempt: AttemptRecord,
    pub verdict: AttemptVerdict,
    pub record: ProgressRecord,
}

/// Launch gating and the pass / fail / lock transition, over the progress store.
#[derive(Clone)]
pub struct AttemptLockoutService {
    store: ProgressStore,
}

impl AttemptLockoutService {
    #[must_use]
    pub fn new(store: ProgressStore) -> Self {
        Self { store }
    }

    #[must_use]
    pub fn policy(&self) -> &QuizPolicy {
        self.store.policy()
    }

    /// Whether a quiz may start for this event right now.
    ///
    /// An expired lock reads as open even before it is cleared in storage.
    ///
    /// # Errors
    ///
    /// Returns `ProgressError` if progress cannot be loaded.
    pub async fn launch_status(
        &self,
        user_id: UserId,
        event_id: EventId,
    ) -> Result<LaunchStatus, ProgressError> {
        let record = self.store.get(user_id, event_id).await?;
        Ok(gate::launch_status(
            &record,
            self.store.policy(),
            self.store.clock().now(),
        ))
    }

    /// Grade a completed session and persist the attempt with its verdict.
    ///
    /// Grading, appending and locking happen inside one revision-checked
    /// write, so the attempt number always matches the stored history.
    ///
    /// # Errors
    ///
    /// Returns `ProgressError` for storage failures or persistent contention.
    #[instrument(skip(self, summary), fields(correct = summary.correct, total = summary.total))]
    pub async fn record_outcome(
        &self,
        user_id: UserId,
        summary: &QuizSummary,
    ) -> Result<AttemptOutcome, ProgressError> {
        let policy = self.store.shared_policy();
        let question_ids = summary.question_ids();
        let (record, (grade, applied)) = self
            .store
            .modify(user_id, summary.event_id, |record, now| {
                let grade = grading::grade(
                    summary.correct,
                    summary.total,
                    record.next_attempt_number(),
                    policy.star_table(),
                );
                let draft = AttemptDraft {
                    score: grade.score,
                    stars: grade.stars,
                    correct: summary.correct,
                    total: summary.total,
                    attempted_at: summary.completed_at,
                    question_ids: question_ids.clone(),
                    timed_out: summary.timed_out,
                };
                let applied = lockout::apply_attempt(record, draft, &policy, now)?;
                Ok((grade, applied))
            })
            .await?;

        match applied.verdict {
            AttemptVerdict::LockedOut { until } => {
                info!(%user_id, event_id = %summary.event_id, %until, "quiz locked after failed attempts");
            }
            AttemptVerdict::Passed => {
                info!(%user_id, event_id = %summary.event_id, score = grade.score, "quiz passed");
            }
            AttemptVerdict::Failed { .. } => {}
        }

        Ok(AttemptOutcome {
            grade,
            attempt: applied.attempt,
            verdict: applied.verdict,
            record,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use history_core::model::ProgressPatch;
    use history_core::time::{fixed_clock, fixed_now};
    use std::sync::Arc;
    use storage::repository::InMemoryRepository;

    use crate::quiz::AnswerRecord;

    fn summary(correct: u32, total: u32) -> QuizSummary {
        QuizSummary {
            event_id: EventId::new(3),
            correct,
            total,
            answers: (0..total)
                .map(|i| AnswerRecord {
                    question_id: history_core::model::QuestionId::new(u64::from(i) + 1),
                    selected_index: Some(0),
                    is_correct: i < correct,
                    answered_at: Some(fixed_now()),
                })
                .collect(),
            started_at: fixed_now(),
            completed_at: fixed_now(),
            elapsed: Duration::seconds(20),
            timed_out: false,
        }
    }

    fn service() -> (AttemptLockoutService, ProgressStore) {
        let store = ProgressStore::new(
            fixed_clock(),
            Arc::new(InMemoryRepository::new()),
            Arc::new(QuizPolicy::default()),
        );
        (AttemptLockoutService::new(store.clone()), store)
    }

    #[tokio::test]
    async fn reading_gate_blocks_launch() {
        let (svc, store) = service();
        let user = UserId::new(1);
        let event = EventId::new(3);
        assert!(matches!(
            svc.launch_status(user, event).await.unwrap(),
            LaunchStatus::NeedsReading { .. }
        ));
        store.update(user, event, ProgressPatch::read_ratio(0.8)).await.unwrap();
        assert_eq!(
            svc.launch_status(user, event).await.unwrap(),
            LaunchStatus::Open { remaining_attempts: 2 }
        );
    }

    #[tokio::test]
    async fn second_failure_locks_for_twelve_hours() {
        let (svc, _store) = service();
        let user = UserId::new(1);

        let first = svc.record_outcome(user, &summary(1, 5)).await.unwrap();
        assert_eq!(first.grade.score, 20);
        assert_eq!(
            first.verdict,
            AttemptVerdict::Failed { failed_attempts: 1, remaining: 1 }
        );

        let second = svc.record_outcome(user, &summary(2, 5)).await.unwrap();
        assert_eq!(second.attempt.attempt_number, 2);
        let until = fixed_now() + Duration::hours(12);
        assert_eq!(second.verdict, AttemptVerdict::LockedOut { until });
        assert_eq!(second.record.locked_until(), Some(until));
        assert_eq!(second.record.failed_attempts(), 0);
    }

    #[tokio::test]
    async fn pass_records_stars_and_best_score() {
        let (svc, _store) = service();
        let outcome = svc.record_outcome(UserId::new(1), &summary(9, 10)).await.unwrap();
        assert_eq!(outcome.verdict, AttemptVerdict::Passed);
        assert_eq!(outcome.grade, Grade { score: 90, stars: 3 });
        assert_eq!(outcome.record.best_score(), 90);
        assert_eq!(outcome.record.best_stars(), 3);
        assert_eq!(outcome.attempt.question_ids.len(), 10);
    }

    #[tokio::test]
    async fn lock_expiry_reopens_launch() {
        let (svc, store) = service();
        let user = UserId::new(1);
        let event = EventId::new(3);
        store.update(user, event, ProgressPatch::read_ratio(1.0)).await.unwrap();
        svc.record_outcome(user, &summary(0, 5)).await.unwrap();
        svc.record_outcome(user, &summary(0, 5)).await.unwrap();
        assert!(matches!(
            svc.launch_status(user, event).await.unwrap(),
            LaunchStatus::Locked { purchase_available: true, .. }
        ));

        let mut later = store.clock();
        later.advance(Duration::hours(12));
        let svc = AttemptLockoutService::new(store.with_clock(later));
        assert_eq!(
            svc.launch_status(user, event).await.unwrap(),
            LaunchStatus::Open { remaining_attempts: 2 }
        );
    }
}
