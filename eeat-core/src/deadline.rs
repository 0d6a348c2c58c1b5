//! Per-page time budget

use std::time::{Duration, Instant};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("page deadline exceeded before {stage}")]
pub struct DeadlineExceeded {
    pub stage: String,
}

/// Stand-in for budgets too large to represent as an instant
const FAR_FUTURE: Duration = Duration::from_secs(100 * 365 * 24 * 60 * 60);

/// Absolute point in time by which a page run must finish
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Deadline {
    at: Instant,
}

impl Deadline {
    /// Budgets past what the clock can represent are capped, never overflow
    pub fn after(budget: Duration) -> Self {
        let now = Instant::now();
        let at = now
            .checked_add(budget)
            .or_else(|| now.checked_add(FAR_FUTURE))
            .unwrap_or(now);
        Self { at }
    }

    pub fn at(&self) -> Instant {
        self.at
    }

    /// Zero once the deadline has passed
    pub fn remaining(&self) -> Duration {
        self.at.saturating_duration_since(Instant::now())
    }

    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.at
    }

    /// Gate a stage: fails if no time is left to start it
    pub fn check(&self, stage: &str) -> Result<(), DeadlineExceeded> {
        if self.is_expired() {
            Err(DeadlineExceeded {
                stage: stage.to_string(),
            })
        } else {
            Ok(())
        }
    }
}
