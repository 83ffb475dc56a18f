use std::sync::Arc;

use history_core::model::{EventId, QuestionBank, QuizPolicy, QuizQuestion};
use rand::Rng;
use rand::seq::SliceRandom;
use storage::repository::{QuestionBankRepository, StorageError};

/// Loads an event's question pool and picks the questions for one attempt.
#[derive(Clone)]
pub struct QuestionBankSelector {
    repo: Arc<dyn QuestionBankRepository>,
}

impl QuestionBankSelector {
    #[must_use]
    pub fn new(repo: Arc<dyn QuestionBankRepository>) -> Self {
        Self { repo }
    }

    /// Snapshot the stored pool. An empty bank means no quiz is configured.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the repository is unreachable.
    pub async fn fetch_bank(&self, event_id: EventId) -> Result<QuestionBank, StorageError> {
        let questions = self.repo.fetch_bank(event_id).await?;
        Ok(QuestionBank::new(event_id, questions))
    }

    /// Add or replace a question in an event's pool.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the question cannot be stored.
    pub async fn store_question(
        &self,
        event_id: EventId,
        question: &QuizQuestion,
    ) -> Result<(), StorageError> {
        self.repo.upsert_question(event_id, question).await
    }

    /// Up to `desired` distinct questions in random order.
    ///
    /// Returns the whole pool, shuffled, when it holds fewer than `desired`.
    pub fn sample<R: Rng + ?Sized>(
        bank: &QuestionBank,
        desired: usize,
        rng: &mut R,
    ) -> Vec<QuizQuestion> {
        let mut picked = bank.questions().to_vec();
        picked.shuffle(rng);
        picked.truncate(desired);
        picked
    }

    /// Base count plus a random bonus in `0..=bonus_question_range`.
    pub fn desired_count<R: Rng + ?Sized>(policy: &QuizPolicy, rng: &mut R) -> usize {
        let bonus = rng.random_range(0..=policy.bonus_question_range());
        usize::try_from(policy.base_question_count().saturating_add(bonus)).unwrap_or(usize::MAX)
    }
}
