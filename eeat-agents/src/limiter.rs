//! Shared request spacing for judge calls
//!
//! One limiter is shared by every page task; the next free slot is the only
//! cross-page mutable state and is updated under a lock.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::{Judge, JudgeError, JudgeRequest, SharedJudge};

/// Judge call budget
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimit {
    /// 0 disables limiting
    pub requests_per_minute: u32,
}

impl Default for RateLimit {
    fn default() -> Self {
        Self {
            requests_per_minute: 60,
        }
    }
}

impl RateLimit {
    pub fn interval(&self) -> Duration {
        if self.requests_per_minute == 0 {
            Duration::ZERO
        } else {
            Duration::from_secs(60) / self.requests_per_minute
        }
    }
}

/// Hands out evenly spaced call slots
#[derive(Debug)]
pub struct RateLimiter {
    interval: Duration,
    next_slot: Mutex<Instant>,
}

impl RateLimiter {
    pub fn new(limit: &RateLimit) -> Self {
        Self {
            interval: limit.interval(),
            next_slot: Mutex::new(Instant::now()),
        }
    }

    /// Wait for this caller's slot
    pub async fn acquire(&self) {
        if self.interval.is_zero() {
            return;
        }

        let slot = {
            let mut next = self.next_slot.lock().await;
            let slot = (*next).max(Instant::now());
            *next = slot + self.interval;
            slot
        };

        tokio::time::sleep_until(slot).await;
    }
}

/// Waits for a limiter slot before every inner call
pub struct RateLimitedJudge {
    inner: SharedJudge,
    limiter: Arc<RateLimiter>,
}

impl RateLimitedJudge {
    pub fn new(inner: SharedJudge, limiter: Arc<RateLimiter>) -> Self {
        Self { inner, limiter }
    }
}

#[async_trait]
impl Judge for RateLimitedJudge {
    async fn evaluate(&self, request: &JudgeRequest) -> Result<Value, JudgeError> {
        self.limiter.acquire().await;
        self.inner.evaluate(request).await
    }
}
