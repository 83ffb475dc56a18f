//! Quiz launch gating.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::model::{ProgressRecord, QuizPolicy};

/// Whether a quiz may start, and if not, which call-to-action applies.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum LaunchStatus {
    Open {
        remaining_attempts: u32,
    },
    /// Keep reading.
    NeedsReading {
        read_ratio: f64,
        required: f64,
    },
    /// Wait, or buy more attempts when `purchase_available` is set.
    Locked {
        until: DateTime<Utc>,
        purchase_available: bool,
    },
}

impl LaunchStatus {
    #[must_use]
    pub fn can_launch(&self) -> bool {
        matches!(self, LaunchStatus::Open { .. })
    }
}

#[must_use]
pub fn launch_status(
    record: &ProgressRecord,
    policy: &QuizPolicy,
    now: DateTime<Utc>,
) -> LaunchStatus {
    if let Some(until) = record.active_lock(now) {
        return LaunchStatus::Locked {
            until,
            purchase_available: policy.attempt_packs_enabled(),
        };
    }
    if record.read_ratio() < policy.read_gate() {
        return LaunchStatus::NeedsReading {
            read_ratio: record.read_ratio(),
            required: policy.read_gate(),
        };
    }
    LaunchStatus::Open {
        remaining_attempts: record.remaining_attempts(policy.base_allowance()),
    }
}
