use std::sync::Arc;

use chrono::{DateTime, Utc};
use history_core::model::{AttemptDraft, EventId, ProgressPatch, ProgressRecord, QuizPolicy, UserId};
use storage::repository::{ProgressRepository, StorageError};
use tracing::{debug, instrument};

use crate::Clock;
use crate::error::ProgressError;

/// Number of compare-and-swap rounds before a write gives up.
const MAX_WRITE_TRIES: u32 = 5;

/// Per-(user, event) progress store.
///
/// Every mutation is a read-modify-write over the record's revision, so two
/// writers racing on the same key never silently drop each other's changes.
#[derive(Clone)]
pub struct ProgressStore {
    clock: Clock,
    repo: Arc<dyn ProgressRepository>,
    policy: Arc<QuizPolicy>,
}

impl ProgressStore {
    #[must_use]
    pub fn new(clock: Clock, repo: Arc<dyn ProgressRepository>, policy: Arc<QuizPolicy>) -> Self {
        Self { clock, repo, policy }
    }

    #[must_use]
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    #[must_use]
    pub fn clock(&self) -> Clock {
        self.clock
    }

    #[must_use]
    pub fn policy(&self) -> &QuizPolicy {
        &self.policy
    }

    #[must_use]
    pub fn shared_policy(&self) -> Arc<QuizPolicy> {
        Arc::clone(&self.policy)
    }

    /// Load the record, or a fresh one when nothing has been stored yet.
    ///
    /// The fresh record is not persisted until the first write.
    ///
    /// # Errors
    ///
    /// Returns `ProgressError::Storage` if the repository is unreachable.
    pub async fn get(&self, user_id: UserId, event_id: EventId) -> Result<ProgressRecord, ProgressError> {
        let record = self.repo.load_progress(user_id, event_id).await?;
        Ok(record.unwrap_or_else(|| ProgressRecord::new(event_id)))
    }

    /// Merge a partial update into the stored record.
    ///
    /// `read_ratio` only ever grows; `completed_at` is set once.
    ///
    /// # Errors
    ///
    /// Returns `ProgressError` for storage failures or persistent contention.
    #[instrument(skip(self, patch), fields(read_ratio = ?patch.read_ratio))]
    pub async fn update(
        &self,
        user_id: UserId,
        event_id: EventId,
        patch: ProgressPatch,
    ) -> Result<ProgressRecord, ProgressError> {
        let gate = self.policy.read_gate();
        let (record, ()) = self
            .modify(user_id, event_id, |record, now| {
                record.apply_patch(patch, gate, now);
                Ok(())
            })
            .await?;
        Ok(record)
    }

    /// Append an attempt without running the lockout transition.
    ///
    /// # Errors
    ///
    /// Returns `ProgressError` for storage failures or persistent contention.
    #[instrument(skip(self, draft), fields(score = draft.score))]
    pub async fn append_attempt(
        &self,
        user_id: UserId,
        event_id: EventId,
        draft: AttemptDraft,
    ) -> Result<ProgressRecord, ProgressError> {
        let (record, ()) = self
            .modify(user_id, event_id, |record, _now| {
                record.push_attempt(draft.clone());
                Ok(())
            })
            .await?;
        Ok(record)
    }

    /// Add purchased attempts and lift any active lock.
    ///
    /// # Errors
    ///
    /// Returns `ProgressError` for storage failures or persistent contention.
    #[instrument(skip(self))]
    pub async fn grant_extra_attempts(
        &self,
        user_id: UserId,
        event_id: EventId,
        count: u32,
    ) -> Result<ProgressRecord, ProgressError> {
        let (record, ()) = self
            .modify(user_id, event_id, |record, now| {
                record.grant_extra_attempts(count, now);
                Ok(())
            })
            .await?;
        Ok(record)
    }

    /// Set or clear the lock. `None` clears it.
    ///
    /// # Errors
    ///
    /// Returns `ProgressError::Record` if `until` is not in the future, or
    /// `ProgressError` for storage failures.
    #[instrument(skip(self))]
    pub async fn set_lock(
        &self,
        user_id: UserId,
        event_id: EventId,
        until: Option<DateTime<Utc>>,
    ) -> Result<ProgressRecord, ProgressError> {
        let credits = self.policy.credits_on_lock();
        let (record, ()) = self
            .modify(user_id, event_id, |record, now| {
                match until {
                    Some(until) => record.lock(until, now, credits)?,
                    None => record.clear_lock(),
                }
                Ok(())
            })
            .await?;
        Ok(record)
    }

    /// Read-modify-write loop over the record's revision.
    ///
    /// `apply` may run several times; it must be a pure function of the
    /// record and `now`.
    pub(crate) async fn modify<T, F>(
        &self,
        user_id: UserId,
        event_id: EventId,
        mut apply: F,
    ) -> Result<(ProgressRecord, T), ProgressError>
    where
        F: FnMut(&mut ProgressRecord, DateTime<Utc>) -> Result<T, ProgressError> + Send,
        T: Send,
    {
        for attempt in 1..=MAX_WRITE_TRIES {
            let mut record = self.get(user_id, event_id).await?;
            let out = apply(&mut record, self.clock.now())?;
            match self.repo.save_progress(user_id, &record).await {
                Ok(revision) => return Ok((record.with_revision(revision), out)),
                Err(StorageError::Conflict) => {
                    debug!(%user_id, %event_id, attempt, "progress write lost a race, retrying");
                }
                Err(err) => return Err(err.into()),
            }
        }
        Err(ProgressError::Contended {
            event_id,
            tries: MAX_WRITE_TRIES,
        })
    }
}
