//! Write-through cache around a judge

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use eeat_core::ResultCache;

use crate::{Judge, JudgeError, JudgeRequest, SharedJudge};

/// Serves hits from the cache and stores every successful inner result.
///
/// Sits outside validation, so only validated payloads are ever written. The
/// key is pinned into the request's [`PinSet`](eeat_core::PinSet) before the
/// lookup, so the entry stays protected from the moment it is read or written
/// until the page run drops the set.
pub struct CachedJudge {
    inner: SharedJudge,
    cache: ResultCache,
}

impl CachedJudge {
    pub fn new(inner: SharedJudge, cache: ResultCache) -> Self {
        Self { inner, cache }
    }
}

#[async_trait]
impl Judge for CachedJudge {
    async fn evaluate(&self, request: &JudgeRequest) -> Result<Value, JudgeError> {
        request.pins.hold(self.cache.pin(&request.cache_key)?);

        if let Some(payload) = self.cache.get(&request.cache_key)? {
            debug!(url = %request.url, key = %request.cache_key, "Judge cache hit");
            return Ok(payload);
        }

        let payload = self.inner.evaluate(request).await?;
        self.cache.put(&request.cache_key, payload.clone())?;
        Ok(payload)
    }
}
