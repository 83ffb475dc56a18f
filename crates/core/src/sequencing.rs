//! Which events of a curriculum phase are open.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use thiserror::Error;

use crate::model::EventId;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum CurriculumError {
    #[error("curriculum phase name cannot be empty")]
    EmptyName,

    #[error("event {0} appears more than once in the phase")]
    DuplicateEvent(EventId),
}

/// An ordered list of events within one curriculum phase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Curriculum {
    phase: String,
    events: Vec<EventId>,
}

impl Curriculum {
    /// # Errors
    ///
    /// Returns `CurriculumError` for a blank phase name or repeated events.
    pub fn new(phase: impl Into<String>, events: Vec<EventId>) -> Result<Self, CurriculumError> {
        let phase = phase.into().trim().to_string();
        if phase.is_empty() {
            return Err(CurriculumError::EmptyName);
        }
        let mut seen = HashSet::with_capacity(events.len());
        for id in &events {
            if !seen.insert(*id) {
                return Err(CurriculumError::DuplicateEvent(*id));
            }
        }
        Ok(Self { phase, events })
    }

    #[must_use]
    pub fn phase(&self) -> &str {
        &self.phase
    }

    #[must_use]
    pub fn events(&self) -> &[EventId] {
        &self.events
    }
}

/// Accessibility for each position given the best score at each position.
///
/// Position 0 is always open; position `i` is open iff position `i - 1`
/// reached `passing_score`.
#[must_use]
pub fn accessible(best_scores: &[u8], passing_score: u8) -> Vec<bool> {
    let mut out = Vec::with_capacity(best_scores.len());
    for idx in 0..best_scores.len() {
        let open = idx == 0 || best_scores[idx - 1] >= passing_score;
        out.push(open);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_event_is_always_open() {
        assert_eq!(accessible(&[0], 70), vec![true]);
        assert!(accessible(&[], 70).is_empty());
    }

    #[test]
    fn chain_unlocks_one_step_at_a_time() {
        assert_eq!(accessible(&[0, 0, 0], 70), vec![true, false, false]);
        assert_eq!(accessible(&[69, 0, 0], 70), vec![true, false, false]);
        assert_eq!(accessible(&[70, 0, 0], 70), vec![true, true, false]);
        assert_eq!(accessible(&[70, 70, 0], 70), vec![true, true, true]);
    }

    #[test]
    fn access_only_depends_on_the_direct_predecessor() {
        assert_eq!(accessible(&[0, 90, 0], 70), vec![true, false, true]);
    }

    #[test]
    fn curriculum_rejects_duplicates() {
        let err = Curriculum::new(
            "Revolutions",
            vec![EventId::new(1), EventId::new(2), EventId::new(1)],
        )
        .unwrap_err();
        assert_eq!(err, CurriculumError::DuplicateEvent(EventId::new(1)));
        assert_eq!(
            Curriculum::new("  ", vec![]).unwrap_err(),
            CurriculumError::EmptyName
        );
    }
}
