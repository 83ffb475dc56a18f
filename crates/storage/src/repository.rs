use async_trait::async_trait;
use history_core::model::{EventId, ProgressRecord, QuestionId, QuizQuestion, UserId};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};
use thiserror::Error;

/// Errors surfaced by storage adapters.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StorageError {
    /// The record changed since it was read; reload and retry.
    #[error("conflict")]
    Conflict,

    #[error("connection error: {0}")]
    Connection(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Namespaced key under which a user's progress on an event is stored.
#[must_use]
pub fn progress_key(user_id: UserId, event_id: EventId) -> String {
    format!("history:progress:{user_id}:{event_id}")
}

/// Decode a stored progress payload.
///
/// Corrupt JSON, or a payload that belongs to a different event, is logged
/// and reported as `None` so callers fall back to a fresh record.
#[must_use]
pub fn decode_progress(
    user_id: UserId,
    event_id: EventId,
    payload: &str,
) -> Option<ProgressRecord> {
    match serde_json::from_str::<ProgressRecord>(payload) {
        Ok(mut record) if record.event_id() == event_id => {
            record.normalize();
            Some(record)
        }
        Ok(record) => {
            tracing::warn!(
                key = %progress_key(user_id, event_id),
                stored_event = %record.event_id(),
                "progress payload belongs to another event; ignoring it"
            );
            None
        }
        Err(err) => {
            tracing::warn!(
                key = %progress_key(user_id, event_id),
                error = %err,
                "malformed progress payload; ignoring it"
            );
            None
        }
    }
}

/// Encode a record for storage.
///
/// # Errors
///
/// Returns `StorageError::Serialization` if the record cannot be encoded.
pub fn encode_progress(record: &ProgressRecord) -> Result<String, StorageError> {
    serde_json::to_string(record).map_err(|e| StorageError::Serialization(e.to_string()))
}

/// Rebuild a loaded record, substituting a fresh one for an unreadable payload.
#[must_use]
pub fn progress_from_row(
    user_id: UserId,
    event_id: EventId,
    payload: &str,
    revision: u64,
) -> ProgressRecord {
    decode_progress(user_id, event_id, payload)
        .unwrap_or_else(|| ProgressRecord::new(event_id))
        .with_revision(revision)
}

/// Persistence for per-user, per-event progress.
#[async_trait]
pub trait ProgressRepository: Send + Sync {
    /// Load the stored record, carrying its revision.
    ///
    /// Returns `Ok(None)` when nothing has been stored yet. A stored but
    /// unreadable payload yields a fresh record at the stored revision.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` for backend failures.
    async fn load_progress(
        &self,
        user_id: UserId,
        event_id: EventId,
    ) -> Result<Option<ProgressRecord>, StorageError>;

    /// Store `record` if the stored revision still equals `record.revision()`.
    ///
    /// Returns the new revision.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Conflict` if another writer got there first.
    async fn save_progress(
        &self,
        user_id: UserId,
        record: &ProgressRecord,
    ) -> Result<u64, StorageError>;
}

/// Persistence for per-event question pools.
#[async_trait]
pub trait QuestionBankRepository: Send + Sync {
    /// All questions configured for an event, ordered by question id.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` for backend failures.
    async fn fetch_bank(&self, event_id: EventId) -> Result<Vec<QuizQuestion>, StorageError>;

    /// Insert or replace one question.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the question cannot be stored.
    async fn upsert_question(
        &self,
        event_id: EventId,
        question: &QuizQuestion,
    ) -> Result<(), StorageError>;
}

#[derive(Debug, Clone)]
struct StoredProgress {
    revision: u64,
    payload: String,
}

/// In-memory repository for tests and prototyping.
///
/// Progress is kept as JSON strings under namespaced keys, mirroring a
/// browser-style key/value store.
#[derive(Clone, Default)]
pub struct InMemoryRepository {
    progress: Arc<Mutex<HashMap<String, StoredProgress>>>,
    questions: Arc<Mutex<HashMap<EventId, BTreeMap<QuestionId, QuizQuestion>>>>,
}

impl InMemoryRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store an arbitrary payload, bypassing encoding. Used to simulate
    /// corrupted or legacy data.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Connection` if the lock is poisoned.
    pub fn put_raw_progress(
        &self,
        user_id: UserId,
        event_id: EventId,
        revision: u64,
        payload: impl Into<String>,
    ) -> Result<(), StorageError> {
        let mut guard = self
            .progress
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        guard.insert(
            progress_key(user_id, event_id),
            StoredProgress {
                revision,
                payload: payload.into(),
            },
        );
        Ok(())
    }

    /// The raw stored payload, if any.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Connection` if the lock is poisoned.
    pub fn raw_progress(
        &self,
        user_id: UserId,
        event_id: EventId,
    ) -> Result<Option<String>, StorageError> {
        let guard = self
            .progress
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        Ok(guard
            .get(&progress_key(user_id, event_id))
            .map(|s| s.payload.clone()))
    }
}

#[async_trait]
impl ProgressRepository for InMemoryRepository {
    async fn load_progress(
        &self,
        user_id: UserId,
        event_id: EventId,
    ) -> Result<Option<ProgressRecord>, StorageError> {
        let guard = self
            .progress
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        Ok(guard
            .get(&progress_key(user_id, event_id))
            .map(|stored| progress_from_row(user_id, event_id, &stored.payload, stored.revision)))
    }

    async fn save_progress(
        &self,
        user_id: UserId,
        record: &ProgressRecord,
    ) -> Result<u64, StorageError> {
        let payload = encode_progress(record)?;
        let mut guard = self
            .progress
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        let key = progress_key(user_id, record.event_id());
        let current = guard.get(&key).map_or(0, |s| s.revision);
        if current != record.revision() {
            return Err(StorageError::Conflict);
        }
        let revision = current + 1;
        guard.insert(key, StoredProgress { revision, payload });
        Ok(revision)
    }
}

#[async_trait]
impl QuestionBankRepository for InMemoryRepository {
    async fn fetch_bank(&self, event_id: EventId) -> Result<Vec<QuizQuestion>, StorageError> {
        let guard = self
            .questions
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        Ok(guard
            .get(&event_id)
            .map(|bank| bank.values().cloned().collect())
            .unwrap_or_default())
    }

    async fn upsert_question(
        &self,
        event_id: EventId,
        question: &QuizQuestion,
    ) -> Result<(), StorageError> {
        let mut guard = self
            .questions
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        guard
            .entry(event_id)
            .or_default()
            .insert(question.id(), question.clone());
        Ok(())
    }
}

/// Aggregates repositories behind trait objects for easy backend swapping.
#[derive(Clone)]
pub struct Storage {
    pub progress: Arc<dyn ProgressRepository>,
    pub questions: Arc<dyn QuestionBankRepository>,
}

impl Storage {
    #[must_use]
    pub fn in_memory() -> Self {
        Self::from_in_memory(InMemoryRepository::new())
    }

    /// Wrap an existing in-memory repository, keeping a handle for inspection.
    #[must_use]
    pub fn from_in_memory(repo: InMemoryRepository) -> Self {
        let progress: Arc<dyn ProgressRepository> = Arc::new(repo.clone());
        let questions: Arc<dyn QuestionBankRepository> = Arc::new(repo);
        Self {
            progress,
            questions,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use history_core::model::AttemptDraft;
    use history_core::time::fixed_now;

    fn question(id: u64) -> QuizQuestion {
        QuizQuestion::new(
            QuestionId::new(id),
            format!("Q{id}"),
            vec!["a".into(), "b".into()],
            0,
            "because",
        )
        .unwrap()
    }

    #[tokio::test]
    async fn missing_progress_is_none() {
        let repo = InMemoryRepository::new();
        let loaded = repo
            .load_progress(UserId::new(1), EventId::new(1))
            .await
            .unwrap();
        assert!(loaded.is_none());
    }

    #[tokio::test]
    async fn round_trips_progress_with_revisions() {
        let repo = InMemoryRepository::new();
        let user = UserId::new(1);
        let mut record = ProgressRecord::new(EventId::new(3));
        record.apply_read_ratio(0.9, 0.8, fixed_now());
        record.push_attempt(AttemptDraft {
            score: 80,
            stars: 2,
            correct: 4,
            total: 5,
            attempted_at: fixed_now(),
            question_ids: vec![QuestionId::new(1)],
            timed_out: false,
        });

        let rev = repo.save_progress(user, &record).await.unwrap();
        assert_eq!(rev, 1);

        let loaded = repo
            .load_progress(user, EventId::new(3))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(loaded.revision(), 1);
        assert_eq!(loaded.best_score(), 80);
        assert_eq!(loaded.completed_at(), Some(fixed_now()));
    }

    #[tokio::test]
    async fn stale_revision_conflicts() {
        let repo = InMemoryRepository::new();
        let user = UserId::new(1);
        let record = ProgressRecord::new(EventId::new(3));
        repo.save_progress(user, &record).await.unwrap();

        let err = repo.save_progress(user, &record).await.unwrap_err();
        assert!(matches!(err, StorageError::Conflict));
    }

    #[tokio::test]
    async fn malformed_payload_reads_as_fresh_record() {
        let repo = InMemoryRepository::new();
        let (user, event) = (UserId::new(2), EventId::new(9));
        repo.put_raw_progress(user, event, 4, "{not json").unwrap();

        let loaded = repo.load_progress(user, event).await.unwrap().unwrap();
        assert_eq!(loaded.revision(), 4);
        assert_eq!(loaded.read_ratio(), 0.0);
        assert!(loaded.attempts().is_empty());

        repo.save_progress(user, &loaded).await.unwrap();
        let healed = repo.raw_progress(user, event).unwrap().unwrap();
        assert!(healed.contains("\"eventId\":9"));
    }

    #[tokio::test]
    async fn payload_for_another_event_is_ignored() {
        let repo = InMemoryRepository::new();
        let user = UserId::new(2);
        let other = encode_progress(&ProgressRecord::new(EventId::new(1))).unwrap();
        repo.put_raw_progress(user, EventId::new(2), 1, other).unwrap();

        let loaded = repo
            .load_progress(user, EventId::new(2))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(loaded.event_id(), EventId::new(2));
    }

    #[tokio::test]
    async fn bank_is_ordered_and_upserts_replace() {
        let repo = InMemoryRepository::new();
        let event = EventId::new(7);
        repo.upsert_question(event, &question(2)).await.unwrap();
        repo.upsert_question(event, &question(1)).await.unwrap();
        repo.upsert_question(event, &question(2)).await.unwrap();

        let bank = repo.fetch_bank(event).await.unwrap();
        let ids: Vec<_> = bank.iter().map(QuizQuestion::id).collect();
        assert_eq!(ids, vec![QuestionId::new(1), QuestionId::new(2)]);
        assert!(repo.fetch_bank(EventId::new(8)).await.unwrap().is_empty());
    }

    #[test]
    fn keys_are_namespaced() {
        assert_eq!(
            progress_key(UserId::new(5), EventId::new(12)),
            "history:progress:5:12"
        );
    }
}
