use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::ids::{EventId, QuestionId};
use crate::model::policy::CreditsOnLock;

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ProgressRecordError {
    #[error("lock must end after {now}, got {until}")]
    LockNotInFuture {
        until: DateTime<Utc>,
        now: DateTime<Utc>,
    },
}

//
// ─── ATTEMPTS ──────────────────────────────────────────────────────────────────
//

/// One graded quiz attempt. Never mutated once appended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttemptRecord {
    pub attempt_number: u32,
    pub score: u8,
    pub stars: u8,
    pub correct: u32,
    pub total: u32,
    pub attempted_at: DateTime<Utc>,
    pub question_ids: Vec<QuestionId>,
    #[serde(default)]
    pub timed_out: bool,
}

/// Attempt data before the record assigns its attempt number.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttemptDraft {
    pub score: u8,
    pub stars: u8,
    pub correct: u32,
    pub total: u32,
    pub attempted_at: DateTime<Utc>,
    pub question_ids: Vec<QuestionId>,
    pub timed_out: bool,
}

//
// ─── PATCH ─────────────────────────────────────────────────────────────────────
//

/// Fields the reading UI may merge into a record.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ProgressPatch {
    pub read_ratio: Option<f64>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl ProgressPatch {
    #[must_use]
    pub fn read_ratio(ratio: f64) -> Self {
        Self {
            read_ratio: Some(ratio),
            completed_at: None,
        }
    }

    #[must_use]
    pub fn with_completed_at(mut self, at: DateTime<Utc>) -> Self {
        self.completed_at = Some(at);
        self
    }
}

//
// ─── RECORD ────────────────────────────────────────────────────────────────────
//

/// A learner's progress on one event.
///
/// All mutation goes through methods that keep the invariants: the read
/// ratio only grows, attempts are append-only, best score/stars are running
/// maxima, and a lock always ends in the future when it is set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressRecord {
    event_id: EventId,
    #[serde(default)]
    read_ratio: f64,
    #[serde(default)]
    completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    attempts: Vec<AttemptRecord>,
    #[serde(default)]
    best_score: u8,
    #[serde(default)]
    best_stars: u8,
    #[serde(default)]
    last_attempt_at: Option<DateTime<Utc>>,
    #[serde(default)]
    failed_attempts: u32,
    #[serde(default)]
    extra_attempts: u32,
    #[serde(default)]
    locked_until: Option<DateTime<Utc>>,
    #[serde(skip)]
    revision: u64,
}

impl ProgressRecord {
    /// Fresh record for an event nobody has opened yet.
    #[must_use]
    pub fn new(event_id: EventId) -> Self {
        Self {
            event_id,
            read_ratio: 0.0,
            completed_at: None,
            attempts: Vec::new(),
            best_score: 0,
            best_stars: 0,
            last_attempt_at: None,
            failed_attempts: 0,
            extra_attempts: 0,
            locked_until: None,
            revision: 0,
        }
    }

    #[must_use]
    pub fn event_id(&self) -> EventId {
        self.event_id
    }

    #[must_use]
    pub fn read_ratio(&self) -> f64 {
        self.read_ratio
    }

    #[must_use]
    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.completed_at
    }

    #[must_use]
    pub fn attempts(&self) -> &[AttemptRecord] {
        &self.attempts
    }

    #[must_use]
    pub fn best_score(&self) -> u8 {
        self.best_score
    }

    #[must_use]
    pub fn best_stars(&self) -> u8 {
        self.best_stars
    }

    #[must_use]
    pub fn last_attempt_at(&self) -> Option<DateTime<Utc>> {
        self.last_attempt_at
    }

    #[must_use]
    pub fn failed_attempts(&self) -> u32 {
        self.failed_attempts
    }

    #[must_use]
    pub fn extra_attempts(&self) -> u32 {
        self.extra_attempts
    }

    #[must_use]
    pub fn locked_until(&self) -> Option<DateTime<Utc>> {
        self.locked_until
    }

    /// Storage revision this snapshot was read at. Not serialized.
    #[must_use]
    pub fn revision(&self) -> u64 {
        self.revision
    }

    #[must_use]
    pub fn with_revision(mut self, revision: u64) -> Self {
        self.revision = revision;
        self
    }

    #[must_use]
    pub fn next_attempt_number(&self) -> u32 {
        u32::try_from(self.attempts.len())
            .unwrap_or(u32::MAX)
            .saturating_add(1)
    }

    /// The lock end, if it has not passed yet.
    #[must_use]
    pub fn active_lock(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.locked_until.filter(|until| *until > now)
    }

    #[must_use]
    pub fn is_locked(&self, now: DateTime<Utc>) -> bool {
        self.active_lock(now).is_some()
    }

    /// Failures tolerated before a lock: base allowance plus purchased credits.
    #[must_use]
    pub fn allowance(&self, base_allowance: u32) -> u32 {
        base_allowance.saturating_add(self.extra_attempts)
    }

    #[must_use]
    pub fn remaining_attempts(&self, base_allowance: u32) -> u32 {
        self.allowance(base_allowance)
            .saturating_sub(self.failed_attempts)
    }

    /// Raise the read ratio and stamp completion when the gate is crossed.
    ///
    /// Lower, non-finite or out-of-range values never lower the stored
    /// ratio. Returns `true` if anything changed.
    pub fn apply_read_ratio(&mut self, ratio: f64, gate: f64, now: DateTime<Utc>) -> bool {
        self.apply_patch(ProgressPatch::read_ratio(ratio), gate, now)
    }

    /// Merge a partial update. Returns `true` if anything changed.
    pub fn apply_patch(&mut self, patch: ProgressPatch, gate: f64, now: DateTime<Utc>) -> bool {
        let mut changed = false;
        if let Some(ratio) = patch.read_ratio.filter(|r| r.is_finite()) {
            let ratio = ratio.clamp(0.0, 1.0);
            if ratio > self.read_ratio {
                self.read_ratio = ratio;
                changed = true;
            }
        }
        if self.completed_at.is_none() {
            if let Some(explicit) = patch.completed_at {
                self.completed_at = Some(explicit);
                changed = true;
            } else if self.read_ratio >= gate {
                self.completed_at = Some(now);
                changed = true;
            }
        }
        changed
    }

    /// Append an attempt, numbering it and updating the running maxima.
    pub fn push_attempt(&mut self, draft: AttemptDraft) -> &AttemptRecord {
        let attempt = AttemptRecord {
            attempt_number: self.next_attempt_number(),
            score: draft.score.min(100),
            stars: draft.stars,
            correct: draft.correct,
            total: draft.total,
            attempted_at: draft.attempted_at,
            question_ids: draft.question_ids,
            timed_out: draft.timed_out,
        };
        self.best_score = self.best_score.max(attempt.score);
        self.best_stars = self.best_stars.max(attempt.stars);
        self.last_attempt_at = Some(attempt.attempted_at);
        self.attempts.push(attempt);
        &self.attempts[self.attempts.len() - 1]
    }

    /// A passing attempt clears the failure run and any lock.
    pub fn record_pass(&mut self, now: DateTime<Utc>) {
        self.failed_attempts = 0;
        self.locked_until = None;
        if self.completed_at.is_none() {
            self.completed_at = Some(now);
        }
    }

    /// Returns the new consecutive failure count.
    pub fn record_failure(&mut self) -> u32 {
        self.failed_attempts = self.failed_attempts.saturating_add(1);
        self.failed_attempts
    }

    /// Impose a lock ending at `until`.
    ///
    /// The failure run always resets; purchased credits reset only under
    /// `CreditsOnLock::Forfeit`.
    ///
    /// # Errors
    ///
    /// Returns `ProgressRecordError::LockNotInFuture` unless `until > now`.
    pub fn lock(
        &mut self,
        until: DateTime<Utc>,
        now: DateTime<Utc>,
        credits: CreditsOnLock,
    ) -> Result<(), ProgressRecordError> {
        if until <= now {
            return Err(ProgressRecordError::LockNotInFuture { until, now });
        }
        self.locked_until = Some(until);
        self.failed_attempts = 0;
        if credits == CreditsOnLock::Forfeit {
            self.extra_attempts = 0;
        }
        Ok(())
    }

    pub fn clear_lock(&mut self) {
        self.locked_until = None;
    }

    /// Add purchased credits. An active lock is lifted and its failure run
    /// forgotten.
    pub fn grant_extra_attempts(&mut self, count: u32, now: DateTime<Utc>) {
        self.extra_attempts = self.extra_attempts.saturating_add(count);
        if self.is_locked(now) {
            self.failed_attempts = 0;
        }
        self.locked_until = None;
    }

    /// Repair a decoded record so the invariants hold again.
    pub fn normalize(&mut self) {
        if !self.read_ratio.is_finite() {
            self.read_ratio = 0.0;
        }
        self.read_ratio = self.read_ratio.clamp(0.0, 1.0);
        self.best_score = self.attempts.iter().map(|a| a.score.min(100)).max().unwrap_or(0);
        self.best_stars = self.attempts.iter().map(|a| a.stars).max().unwrap_or(0);
        if let Some(last) = self.attempts.last() {
            self.last_attempt_at = Some(
                self.last_attempt_at
                    .map_or(last.attempted_at, |t| t.max(last.attempted_at)),
            );
        }
    }
}
