use chrono::Duration;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::grading::{StarTable, StarTableError};

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq)]
#[non_exhaustive]
pub enum PolicyError {
    #[error("passing score must be between 1 and 100, got {0}")]
    InvalidPassingScore(u8),

    #[error("base attempt allowance must be > 0")]
    InvalidBaseAllowance,

    #[error("lockout duration must be > 0 seconds")]
    InvalidLockout,

    #[error("read gate must be in (0, 1], got {0}")]
    InvalidReadGate(f64),

    #[error("read epsilon must be in [0, 1), got {0}")]
    InvalidReadEpsilon(f64),

    #[error("base question count must be > 0")]
    InvalidQuestionCount,

    #[error("default seconds per question must be > 0")]
    InvalidSecondsPerQuestion,

    #[error("auto-advance delay must be at most 10000 ms, got {0}")]
    InvalidAutoAdvance(u32),

    #[error(transparent)]
    Stars(#[from] StarTableError),
}

//
// ─── CREDITS ON LOCK ───────────────────────────────────────────────────────────
//

/// What happens to unused purchased credits when a lockout trips.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CreditsOnLock {
    /// The lock consumes every remaining purchased credit.
    #[default]
    Forfeit,
    /// Purchased credits survive the lock and extend the next window.
    Keep,
}

//
// ─── POLICY ────────────────────────────────────────────────────────────────────
//

/// Numeric knobs for gating, grading and lockout.
#[derive(Debug, Clone, PartialEq)]
pub struct QuizPolicy {
    passing_score: u8,
    base_allowance: u32,
    lockout_secs: u32,
    read_gate: f64,
    read_epsilon: f64,
    base_question_count: u32,
    bonus_question_range: u32,
    default_secs_per_question: u32,
    auto_advance_millis: u32,
    star_table: StarTable,
    credits_on_lock: CreditsOnLock,
    attempt_packs_enabled: bool,
}

impl Default for QuizPolicy {
    /// - pass at 70%
    /// - two failing attempts before a 12 hour lockout
    /// - quiz unlocks at 80% read
    /// - 5 to 10 questions per attempt, 30 seconds each
    fn default() -> Self {
        Self {
            passing_score: 70,
            base_allowance: 2,
            lockout_secs: 12 * 60 * 60,
            read_gate: 0.8,
            read_epsilon: 0.01,
            base_question_count: 5,
            bonus_question_range: 5,
            default_secs_per_question: 30,
            auto_advance_millis: 1_200,
            star_table: StarTable::default(),
            credits_on_lock: CreditsOnLock::Forfeit,
            attempt_packs_enabled: true,
        }
    }
}

impl QuizPolicy {
    #[must_use]
    pub fn passing_score(&self) -> u8 {
        self.passing_score
    }

    #[must_use]
    pub fn base_allowance(&self) -> u32 {
        self.base_allowance
    }

    #[must_use]
    pub fn lockout_duration(&self) -> Duration {
        Duration::seconds(i64::from(self.lockout_secs))
    }

    #[must_use]
    pub fn read_gate(&self) -> f64 {
        self.read_gate
    }

    #[must_use]
    pub fn read_epsilon(&self) -> f64 {
        self.read_epsilon
    }

    #[must_use]
    pub fn base_question_count(&self) -> u32 {
        self.base_question_count
    }

    #[must_use]
    pub fn bonus_question_range(&self) -> u32 {
        self.bonus_question_range
    }

    #[must_use]
    pub fn default_time_per_question(&self) -> Duration {
        Duration::seconds(i64::from(self.default_secs_per_question))
    }

    #[must_use]
    pub fn auto_advance_delay(&self) -> Duration {
        Duration::milliseconds(i64::from(self.auto_advance_millis))
    }

    #[must_use]
    pub fn star_table(&self) -> &StarTable {
        &self.star_table
    }

    #[must_use]
    pub fn credits_on_lock(&self) -> CreditsOnLock {
        self.credits_on_lock
    }

    #[must_use]
    pub fn attempt_packs_enabled(&self) -> bool {
        self.attempt_packs_enabled
    }

    #[must_use]
    pub fn is_passing(&self, score: u8) -> bool {
        score >= self.passing_score
    }

    #[must_use]
    pub fn with_credits_on_lock(mut self, mode: CreditsOnLock) -> Self {
        self.credits_on_lock = mode;
        self
    }
}

//
// ─── DRAFT ─────────────────────────────────────────────────────────────────────
//

/// Partial policy as read from a config file; unset fields keep defaults.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct QuizPolicyDraft {
    pub passing_score: Option<u8>,
    pub base_allowance: Option<u32>,
    pub lockout_secs: Option<u32>,
    pub read_gate: Option<f64>,
    pub read_epsilon: Option<f64>,
    pub base_question_count: Option<u32>,
    pub bonus_question_range: Option<u32>,
    pub default_secs_per_question: Option<u32>,
    pub auto_advance_millis: Option<u32>,
    pub star_breakpoints: Option<Vec<u8>>,
    pub credits_on_lock: Option<CreditsOnLock>,
    pub attempt_packs_enabled: Option<bool>,
}

impl QuizPolicyDraft {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge onto the defaults and validate.
    ///
    /// # Errors
    ///
    /// Returns `PolicyError` naming the first out-of-range field.
    pub fn validate(self) -> Result<QuizPolicy, PolicyError> {
        let d = QuizPolicy::default();

        let passing_score = self.passing_score.unwrap_or(d.passing_score);
        if !(1..=100).contains(&passing_score) {
            return Err(PolicyError::InvalidPassingScore(passing_score));
        }
        let base_allowance = self.base_allowance.unwrap_or(d.base_allowance);
        if base_allowance == 0 {
            return Err(PolicyError::InvalidBaseAllowance);
        }
        let lockout_secs = self.lockout_secs.unwrap_or(d.lockout_secs);
        if lockout_secs == 0 {
            return Err(PolicyError::InvalidLockout);
        }
        let read_gate = self.read_gate.unwrap_or(d.read_gate);
        if !read_gate.is_finite() || read_gate <= 0.0 || read_gate > 1.0 {
            return Err(PolicyError::InvalidReadGate(read_gate));
        }
        let read_epsilon = self.read_epsilon.unwrap_or(d.read_epsilon);
        if !read_epsilon.is_finite() || !(0.0..1.0).contains(&read_epsilon) {
            return Err(PolicyError::InvalidReadEpsilon(read_epsilon));
        }
        let base_question_count = self.base_question_count.unwrap_or(d.base_question_count);
        if base_question_count == 0 {
            return Err(PolicyError::InvalidQuestionCount);
        }
        let default_secs_per_question = self
            .default_secs_per_question
            .unwrap_or(d.default_secs_per_question);
        if default_secs_per_question == 0 {
            return Err(PolicyError::InvalidSecondsPerQuestion);
        }
        let auto_advance_millis = self.auto_advance_millis.unwrap_or(d.auto_advance_millis);
        if auto_advance_millis > 10_000 {
            return Err(PolicyError::InvalidAutoAdvance(auto_advance_millis));
        }
        let star_table = match self.star_breakpoints {
            Some(points) => StarTable::new(points)?,
            None => d.star_table,
        };

        Ok(QuizPolicy {
            passing_score,
            base_allowance,
            lockout_secs,
            read_gate,
            read_epsilon,
            base_question_count,
            bonus_question_range: self.bonus_question_range.unwrap_or(d.bonus_question_range),
            default_secs_per_question,
            auto_advance_millis,
            star_table,
            credits_on_lock: self.credits_on_lock.unwrap_or(d.credits_on_lock),
            attempt_packs_enabled: self
                .attempt_packs_enabled
                .unwrap_or(d.attempt_packs_enabled),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_draft_yields_defaults() {
        let policy = QuizPolicyDraft::new().validate().unwrap();
        assert_eq!(policy, QuizPolicy::default());
        assert_eq!(policy.lockout_duration(), Duration::hours(12));
        assert!(policy.is_passing(70));
        assert!(!policy.is_passing(69));
    }

    #[test]
    fn rejects_zero_allowance() {
        let draft = QuizPolicyDraft {
            base_allowance: Some(0),
            ..QuizPolicyDraft::default()
        };
        assert_eq!(draft.validate().unwrap_err(), PolicyError::InvalidBaseAllowance);
    }

    #[test]
    fn rejects_read_gate_outside_unit_interval() {
        for gate in [0.0, 1.5, f64::NAN] {
            let draft = QuizPolicyDraft {
                read_gate: Some(gate),
                ..QuizPolicyDraft::default()
            };
            assert!(matches!(
                draft.validate(),
                Err(PolicyError::InvalidReadGate(_))
            ));
        }
    }

    #[test]
    fn custom_star_table_is_validated() {
        let draft = QuizPolicyDraft {
            star_breakpoints: Some(vec![90, 10]),
            ..QuizPolicyDraft::default()
        };
        assert_eq!(
            draft.validate().unwrap_err(),
            PolicyError::Stars(StarTableError::NotAscending)
        );
    }

    #[test]
    fn draft_deserializes_credit_mode() {
        let draft: QuizPolicyDraft =
            serde_json::from_str(r#"{"credits_on_lock":"keep","passing_score":60}"#).unwrap();
        let policy = draft.validate().unwrap();
        assert_eq!(policy.credits_on_lock(), CreditsOnLock::Keep);
        assert_eq!(policy.passing_score(), 60);
    }
}
