use std::sync::Arc;

use history_core::model::QuizPolicy;
use storage::repository::Storage;

use crate::Clock;
use crate::attempts::AttemptLockoutService;
use crate::curriculum::CurriculumService;
use crate::error::AppServicesError;
use crate::progress_store::ProgressStore;
use crate::purchase::PurchaseBridge;
use crate::quiz::{QuestionBankSelector, QuizLoopService, SessionTiming};
use crate::reading::ReadingTracker;

/// Assembles the engine's services over one storage backend and policy.
#[derive(Clone)]
pub struct AppServices {
    progress: ProgressStore,
    questions: QuestionBankSelector,
    attempts: Arc<AttemptLockoutService>,
    quiz_loop: Arc<QuizLoopService>,
    reading: Arc<ReadingTracker>,
    curriculum: Arc<CurriculumService>,
    purchases: Arc<PurchaseBridge>,
}

impl AppServices {
    #[must_use]
    pub fn new(clock: Clock, storage: &Storage, policy: QuizPolicy) -> Self {
        let timing = SessionTiming::from_policy(&policy);
        let progress = ProgressStore::new(clock, Arc::clone(&storage.progress), Arc::new(policy));
        let questions = QuestionBankSelector::new(Arc::clone(&storage.questions));
        let attempts = AttemptLockoutService::new(progress.clone());
        let quiz_loop = Arc::new(QuizLoopService::new(
            clock,
            questions.clone(),
            attempts.clone(),
            timing,
        ));

        Self {
            reading: Arc::new(ReadingTracker::new(progress.clone())),
            curriculum: Arc::new(CurriculumService::new(progress.clone())),
            purchases: Arc::new(PurchaseBridge::new(progress.clone())),
            attempts: Arc::new(attempts),
            quiz_loop,
            questions,
            progress,
        }
    }

    /// Build services backed by `SQLite` storage.
    ///
    /// # Errors
    ///
    /// Returns `AppServicesError` if the database cannot be opened or migrated.
    pub async fn new_sqlite(
        db_url: &str,
        clock: Clock,
        policy: QuizPolicy,
    ) -> Result<Self, AppServicesError> {
        let storage = Storage::sqlite(db_url).await?;
        Ok(Self::new(clock, &storage, policy))
    }

    #[must_use]
    pub fn progress(&self) -> &ProgressStore {
        &self.progress
    }

    #[must_use]
    pub fn questions(&self) -> &QuestionBankSelector {
        &self.questions
    }

    #[must_use]
    pub fn policy(&self) -> &QuizPolicy {
        self.progress.policy()
    }

    #[must_use]
    pub fn attempts(&self) -> Arc<AttemptLockoutService> {
        Arc::clone(&self.attempts)
    }

    #[must_use]
    pub fn quiz_loop(&self) -> Arc<QuizLoopService> {
        Arc::clone(&self.quiz_loop)
    }

    #[must_use]
    pub fn reading(&self) -> Arc<ReadingTracker> {
        Arc::clone(&self.reading)
    }

    #[must_use]
    pub fn curriculum(&self) -> Arc<CurriculumService> {
        Arc::clone(&self.curriculum)
    }

    #[must_use]
    pub fn purchases(&self) -> Arc<PurchaseBridge> {
        Arc::clone(&self.purchases)
    }
}
