//! Score and star computation for a finished quiz.

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum StarTableError {
    #[error("star table needs at least one breakpoint")]
    Empty,

    #[error("star breakpoints must be strictly ascending")]
    NotAscending,

    #[error("star breakpoint {0} is above 100")]
    OutOfRange(u8),
}

/// Ascending score thresholds; each one reached earns one star.
///
/// With the default table `[50, 70, 90]` a score of 69 earns one star and
/// a score of 100 earns three.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<u8>", into = "Vec<u8>")]
pub struct StarTable(Vec<u8>);

impl StarTable {
    /// # Errors
    ///
    /// Returns `StarTableError` unless the breakpoints are non-empty, strictly
    /// ascending and within 0..=100.
    pub fn new(breakpoints: Vec<u8>) -> Result<Self, StarTableError> {
        if breakpoints.is_empty() {
            return Err(StarTableError::Empty);
        }
        if let Some(bad) = breakpoints.iter().find(|b| **b > 100) {
            return Err(StarTableError::OutOfRange(*bad));
        }
        if breakpoints.windows(2).any(|w| w[0] >= w[1]) {
            return Err(StarTableError::NotAscending);
        }
        Ok(Self(breakpoints))
    }

    #[must_use]
    pub fn breakpoints(&self) -> &[u8] {
        &self.0
    }

    /// Highest number of stars this table can award.
    #[must_use]
    pub fn max_stars(&self) -> u8 {
        u8::try_from(self.0.len()).unwrap_or(u8::MAX)
    }

    #[must_use]
    pub fn stars_for(&self, score: u8) -> u8 {
        let earned = self.0.iter().take_while(|b| score >= **b).count();
        u8::try_from(earned).unwrap_or(u8::MAX)
    }
}

impl Default for StarTable {
    fn default() -> Self {
        Self(vec![50, 70, 90])
    }
}

impl TryFrom<Vec<u8>> for StarTable {
    type Error = StarTableError;

    fn try_from(value: Vec<u8>) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<StarTable> for Vec<u8> {
    fn from(table: StarTable) -> Self {
        table.0
    }
}

/// Result of grading one attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Grade {
    pub score: u8,
    pub stars: u8,
}

/// Convert a raw outcome into a percentage and a star count.
///
/// `total == 0` grades as 0 and `correct` is clamped to `total`.
/// `attempt_number` does not influence the current policy.
#[must_use]
pub fn grade(correct: u32, total: u32, attempt_number: u32, stars: &StarTable) -> Grade {
    let _ = attempt_number;
    let score = percentage(correct.min(total), total);
    Grade {
        score,
        stars: stars.stars_for(score),
    }
}

fn percentage(correct: u32, total: u32) -> u8 {
    if total == 0 {
        return 0;
    }
    let ratio = f64::from(correct) / f64::from(total);
    // correct <= total, so the rounded value lies in 0..=100.
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let score = (ratio * 100.0).round() as u8;
    score.min(100)
}
