//! Transient-failure retry with exponential backoff and jitter

use async_trait::async_trait;
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tracing::warn;

use crate::{Judge, JudgeError, JudgeRequest, SharedJudge};

/// Retry policy for transient judge failures
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts, including the first
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    /// Fraction of the delay randomized in both directions (0.0 - 1.0)
    pub jitter: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            base_delay_ms: 500,
            max_delay_ms: 8_000,
            jitter: 0.25,
        }
    }
}

impl RetryPolicy {
    /// No waiting between attempts
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            base_delay_ms: 0,
            max_delay_ms: 0,
            jitter: 0.0,
        }
    }

    /// Delay before retry number `retry` (1-based)
    pub fn delay_for(&self, retry: u32) -> Duration {
        let exp = retry.saturating_sub(1).min(16);
        let base = self
            .base_delay_ms
            .saturating_mul(1u64 << exp)
            .min(self.max_delay_ms) as f64;

        let jitter = self.jitter.clamp(0.0, 1.0);
        let factor = if jitter > 0.0 {
            rand::thread_rng().gen_range(1.0 - jitter..=1.0 + jitter)
        } else {
            1.0
        };
        Duration::from_millis((base * factor).round() as u64)
    }
}

/// Retries transient failures; everything else passes through
pub struct RetryingJudge {
    inner: SharedJudge,
    policy: RetryPolicy,
}

impl RetryingJudge {
    pub fn new(inner: SharedJudge, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }
}

#[async_trait]
impl Judge for RetryingJudge {
    async fn evaluate(&self, request: &JudgeRequest) -> Result<Value, JudgeError> {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            match self.inner.evaluate(request).await {
                Err(JudgeError::Transient { message, .. }) => {
                    if attempt >= max_attempts {
                        return Err(JudgeError::Transient {
                            message,
                            attempts: attempt,
                        });
                    }
                    let delay = self.policy.delay_for(attempt);
                    warn!(
                        url = %request.url,
                        "Judge attempt {}/{} failed: {}; retrying in {:?}",
                        attempt,
                        max_attempts,
                        message,
                        delay
                    );
                    // Only this page's task waits
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                other => return other,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{request, ScriptedJudge};
    use serde_json::json;
    use std::sync::Arc;

    #[test]
    fn test_delay_grows_and_caps() {
        let policy = RetryPolicy {
            jitter: 0.0,
            ..RetryPolicy::default()
        };
        assert_eq!(policy.delay_for(1), Duration::from_millis(500));
        assert_eq!(policy.delay_for(2), Duration::from_millis(1000));
        assert_eq!(policy.delay_for(3), Duration::from_millis(2000));
        assert_eq!(policy.delay_for(10), Duration::from_millis(8000));
    }

    #[test]
    fn test_jitter_stays_in_band() {
        let policy = RetryPolicy::default();
        for _ in 0..100 {
            let d = policy.delay_for(2).as_millis();
            assert!((750..=1250).contains(&d), "delay {} out of band", d);
        }
    }

    #[tokio::test]
    async fn test_retries_transient_then_succeeds() {
        let inner = Arc::new(ScriptedJudge::new(vec![
            Err(JudgeError::Transient {
                message: "timeout".into(),
                attempts: 1,
            }),
            Err(JudgeError::Transient {
                message: "503".into(),
                attempts: 1,
            }),
            Ok(json!({"ok": true})),
        ]));
        let judge = RetryingJudge::new(inner.clone(), RetryPolicy::immediate(3));

        let value = judge.evaluate(&request("u")).await.unwrap();
        assert_eq!(value, json!({"ok": true}));
        assert_eq!(inner.calls(), 3);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_attempts() {
        let inner = Arc::new(ScriptedJudge::repeating(|| {
            Err(JudgeError::Transient {
                message: "overloaded".into(),
                attempts: 1,
            })
        }));
        let judge = RetryingJudge::new(inner.clone(), RetryPolicy::immediate(3));

        let err = judge.evaluate(&request("u")).await.unwrap_err();
        assert!(matches!(err, JudgeError::Transient { attempts: 3, .. }));
        assert_eq!(inner.calls(), 3);
    }

    #[tokio::test]
    async fn test_fatal_errors_are_not_retried() {
        let inner = Arc::new(ScriptedJudge::new(vec![Err(JudgeError::Rejected(
            "401".into(),
        ))]));
        let judge = RetryingJudge::new(inner.clone(), RetryPolicy::immediate(5));

        assert!(matches!(
            judge.evaluate(&request("u")).await,
            Err(JudgeError::Rejected(_))
        ));
        assert_eq!(inner.calls(), 1);
    }
}
