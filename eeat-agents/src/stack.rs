//! Assembles the judge decorator chain
//!
//! Outermost first: cache, schema validation, transient retry, rate limit,
//! backend. The cache therefore only ever sees validated payloads, and every
//! retry attempt waits for its own rate-limit slot.

use std::sync::Arc;

use eeat_core::ResultCache;

use crate::{
    BackendJudge, CachedJudge, RateLimitedJudge, RateLimiter, RetryPolicy, RetryingJudge,
    SharedBackend, SharedJudge, ValidatingJudge,
};

/// Builder for a fully decorated judge
pub struct JudgeStack {
    base: SharedJudge,
    retry: RetryPolicy,
    limiter: Option<Arc<RateLimiter>>,
    cache: Option<ResultCache>,
}

impl JudgeStack {
    /// Stack over an LLM backend
    pub fn new(backend: SharedBackend) -> Self {
        Self::over(Arc::new(BackendJudge::new(backend)))
    }

    /// Stack over any innermost judge
    pub fn over(base: SharedJudge) -> Self {
        Self {
            base,
            retry: RetryPolicy::default(),
            limiter: None,
            cache: None,
        }
    }

    pub fn with_retry(mut self, policy: RetryPolicy) -> Self {
        self.retry = policy;
        self
    }

    /// Share this limiter with every judge built from it
    pub fn with_rate_limiter(mut self, limiter: Arc<RateLimiter>) -> Self {
        self.limiter = Some(limiter);
        self
    }

    pub fn with_cache(mut self, cache: ResultCache) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn build(self) -> SharedJudge {
        let mut judge = self.base;

        if let Some(limiter) = self.limiter {
            judge = Arc::new(RateLimitedJudge::new(judge, limiter));
        }
        judge = Arc::new(RetryingJudge::new(judge, self.retry));
        judge = Arc::new(ValidatingJudge::new(judge));
        if let Some(cache) = self.cache {
            judge = Arc::new(CachedJudge::new(judge, cache));
        }

        judge
    }
}
