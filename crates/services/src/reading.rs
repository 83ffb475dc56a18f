//! Turns scroll positions into read-ratio commits.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use history_core::model::{EventId, ProgressPatch, ProgressRecord, UserId};

use crate::error::ProgressError;
use crate::progress_store::ProgressStore;

/// Fraction of a dossier seen, from scroll geometry.
///
/// Content that fits in the viewport counts as fully read.
#[must_use]
pub fn scroll_ratio(scroll_top: f64, viewport_height: f64, content_height: f64) -> f64 {
    let scrollable = content_height - viewport_height;
    if !scrollable.is_finite() || scrollable <= 0.0 {
        return 1.0;
    }
    if !scroll_top.is_finite() {
        return 0.0;
    }
    (scroll_top / scrollable).clamp(0.0, 1.0)
}

/// Coalesces scroll updates so storage sees one write per meaningful step.
#[derive(Clone)]
pub struct ReadingTracker {
    store: ProgressStore,
    committed: Arc<Mutex<HashMap<(UserId, EventId), f64>>>,
}

impl ReadingTracker {
    #[must_use]
    pub fn new(store: ProgressStore) -> Self {
        Self {
            store,
            committed: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Report the current read ratio.
    ///
    /// Returns the stored record when a write happened, `None` when the
    /// update was coalesced away.
    ///
    /// # Errors
    ///
    /// Returns `ProgressError` if the store cannot be read or written.
    pub async fn record(
        &self,
        user_id: UserId,
        event_id: EventId,
        ratio: f64,
    ) -> Result<Option<ProgressRecord>, ProgressError> {
        if !ratio.is_finite() {
            return Ok(None);
        }
        let ratio = ratio.clamp(0.0, 1.0);

        let last = match self.cached(user_id, event_id) {
            // The stored ratio can fall below the cache when an unreadable
            // payload is replaced by a fresh record.
            Some(last) if ratio <= last => {
                let stored = self.store.get(user_id, event_id).await?.read_ratio();
                if stored < last {
                    self.reseed(user_id, event_id, stored);
                }
                stored.min(last)
            }
            Some(last) => last,
            None => {
                let stored = self.store.get(user_id, event_id).await?.read_ratio();
                self.remember(user_id, event_id, stored);
                stored
            }
        };
        let policy = self.store.policy();
        if !should_commit(last, ratio, policy.read_epsilon(), policy.read_gate()) {
            return Ok(None);
        }

        let record = self
            .store
            .update(user_id, event_id, ProgressPatch::read_ratio(ratio))
            .await?;
        self.remember(user_id, event_id, record.read_ratio());
        Ok(Some(record))
    }

    /// Convenience over [`ReadingTracker::record`] for raw scroll geometry.
    ///
    /// # Errors
    ///
    /// Same as [`ReadingTracker::record`].
    pub async fn record_scroll(
        &self,
        user_id: UserId,
        event_id: EventId,
        scroll_top: f64,
        viewport_height: f64,
        content_height: f64,
    ) -> Result<Option<ProgressRecord>, ProgressError> {
        let ratio = scroll_ratio(scroll_top, viewport_height, content_height);
        self.record(user_id, event_id, ratio).await
    }

    fn cached(&self, user_id: UserId, event_id: EventId) -> Option<f64> {
        let map = self.committed.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        map.get(&(user_id, event_id)).copied()
    }

    fn remember(&self, user_id: UserId, event_id: EventId, ratio: f64) {
        let mut map = self.committed.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let slot = map.entry((user_id, event_id)).or_insert(ratio);
        *slot = slot.max(ratio);
    }

    fn reseed(&self, user_id: UserId, event_id: EventId, ratio: f64) {
        let mut map = self.committed.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        map.insert((user_id, event_id), ratio);
    }
}

fn should_commit(last: f64, next: f64, epsilon: f64, gate: f64) -> bool {
    if next <= last {
        return false;
    }
    let crosses_gate = last < gate && next >= gate;
    let reaches_end = last < 1.0 && next >= 1.0;
    next - last >= epsilon || crosses_gate || reaches_end
}
