//! Attempt/lockout transition over a progress record.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::model::{AttemptDraft, AttemptRecord, ProgressRecord, ProgressRecordError, QuizPolicy};

/// What recording an attempt did to the event's state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "verdict", rename_all = "snake_case")]
pub enum AttemptVerdict {
    /// Score reached the passing threshold.
    Passed,
    /// Failed but still inside the allowance.
    Failed { failed_attempts: u32, remaining: u32 },
    /// Failed and exhausted the allowance; launches are blocked until `until`.
    LockedOut { until: DateTime<Utc> },
}

impl AttemptVerdict {
    #[must_use]
    pub fn is_pass(&self) -> bool {
        matches!(self, AttemptVerdict::Passed)
    }
}

/// The appended attempt together with the verdict it produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppliedAttempt {
    pub attempt: AttemptRecord,
    pub verdict: AttemptVerdict,
}

/// Append `draft` and run the pass / fail / lock transition.
///
/// The failure count is compared against `base_allowance + extra_attempts`,
/// never against the number of recorded attempts.
///
/// # Errors
///
/// Returns `ProgressRecordError` if the computed lock would not end in the
/// future, which a validated policy rules out.
pub fn apply_attempt(
    record: &mut ProgressRecord,
    draft: AttemptDraft,
    policy: &QuizPolicy,
    now: DateTime<Utc>,
) -> Result<AppliedAttempt, ProgressRecordError> {
    let attempt = record.push_attempt(draft).clone();

    let verdict = if policy.is_passing(attempt.score) {
        record.record_pass(now);
        AttemptVerdict::Passed
    } else {
        let failed = record.record_failure();
        let allowance = record.allowance(policy.base_allowance());
        if failed >= allowance {
            let until = now + policy.lockout_duration();
            record.lock(until, now, policy.credits_on_lock())?;
            AttemptVerdict::LockedOut { until }
        } else {
            AttemptVerdict::Failed {
                failed_attempts: failed,
                remaining: allowance - failed,
            }
        }
    };

    Ok(AppliedAttempt { attempt, verdict })
}
