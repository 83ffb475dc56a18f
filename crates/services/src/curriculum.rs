use history_core::model::{EventId, UserId};
use history_core::sequencing::{self, Curriculum};

use crate::error::ProgressError;
use crate::progress_store::ProgressStore;

/// Access state of one event within a curriculum phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventAccess {
    pub event_id: EventId,
    pub position: usize,
    pub accessible: bool,
    pub passed: bool,
    pub best_score: u8,
    pub best_stars: u8,
}

/// Computes which events of a phase a user may open.
///
/// Always reads the latest stored progress; nothing is cached.
#[derive(Clone)]
pub struct CurriculumService {
    store: ProgressStore,
}

impl CurriculumService {
    #[must_use]
    pub fn new(store: ProgressStore) -> Self {
        Self { store }
    }

    /// # Errors
    ///
    /// Returns `ProgressError` if any event's progress cannot be loaded.
    pub async fn access_map(
        &self,
        user_id: UserId,
        curriculum: &Curriculum,
    ) -> Result<Vec<EventAccess>, ProgressError> {
        let mut records = Vec::with_capacity(curriculum.events().len());
        for event_id in curriculum.events() {
            records.push(self.store.get(user_id, *event_id).await?);
        }
        let passing = self.store.policy().passing_score();
        let best_scores: Vec<u8> = records.iter().map(|r| r.best_score()).collect();
        let open = sequencing::accessible(&best_scores, passing);

        Ok(records
            .iter()
            .zip(open)
            .enumerate()
            .map(|(position, (record, accessible))| EventAccess {
                event_id: record.event_id(),
                position,
                accessible,
                passed: record.best_score() >= passing,
                best_score: record.best_score(),
                best_stars: record.best_stars(),
            })
            .collect())
    }

    /// `false` for events outside the curriculum.
    ///
    /// # Errors
    ///
    /// Returns `ProgressError` if progress cannot be loaded.
    pub async fn is_accessible(
        &self,
        user_id: UserId,
        curriculum: &Curriculum,
        event_id: EventId,
    ) -> Result<bool, ProgressError> {
        let Some(position) = curriculum.events().iter().position(|e| *e == event_id) else {
            return Ok(false);
        };
        if position == 0 {
            return Ok(true);
        }
        let previous = curriculum.events()[position - 1];
        let record = self.store.get(user_id, previous).await?;
        Ok(record.best_score() >= self.store.policy().passing_score())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use history_core::model::{AttemptDraft, QuizPolicy};
    use history_core::time::{fixed_clock, fixed_now};
    use std::sync::Arc;
    use storage::repository::InMemoryRepository;

    fn store() -> ProgressStore {
        ProgressStore::new(
            fixed_clock(),
            Arc::new(InMemoryRepository::new()),
            Arc::new(QuizPolicy::default()),
        )
    }

    fn attempt(score: u8) -> AttemptDraft {
        AttemptDraft {
            score,
            stars: 1,
            correct: 0,
            total: 0,
            attempted_at: fixed_now(),
            question_ids: vec![],
            timed_out: false,
        }
    }

    #[tokio::test]
    async fn passing_an_event_opens_the_next() {
        let store = store();
        let svc = CurriculumService::new(store.clone());
        let user = UserId::new(1);
        let phase = Curriculum::new(
            "Antiquity",
            vec![EventId::new(1), EventId::new(2), EventId::new(3)],
        )
        .unwrap();

        let map = svc.access_map(user, &phase).await.unwrap();
        let open: Vec<bool> = map.iter().map(|a| a.accessible).collect();
        assert_eq!(open, vec![true, false, false]);

        store.append_attempt(user, EventId::new(1), attempt(70)).await.unwrap();
        let map = svc.access_map(user, &phase).await.unwrap();
        let open: Vec<bool> = map.iter().map(|a| a.accessible).collect();
        assert_eq!(open, vec![true, true, false]);
        assert!(map[0].passed);
        assert_eq!(map[0].best_score, 70);

        assert!(svc.is_accessible(user, &phase, EventId::new(2)).await.unwrap());
        assert!(!svc.is_accessible(user, &phase, EventId::new(3)).await.unwrap());
        assert!(!svc.is_accessible(user, &phase, EventId::new(99)).await.unwrap());
    }

    #[tokio::test]
    async fn access_is_per_user() {
        let store = store();
        let svc = CurriculumService::new(store.clone());
        let phase = Curriculum::new("Antiquity", vec![EventId::new(1), EventId::new(2)]).unwrap();
        store
            .append_attempt(UserId::new(1), EventId::new(1), attempt(95))
            .await
            .unwrap();
        let other = svc.access_map(UserId::new(2), &phase).await.unwrap();
        assert!(!other[1].accessible);
    }
}
