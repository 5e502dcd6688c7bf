//! Cache-then-backend completion client.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use crate::cache::{CacheEntry, CacheSeed, ReplyCache};
use crate::config::CompletionConfig;
use crate::error::ConfabError;
use crate::util::retry::RetryPolicy;
use crate::util::timeout::with_timeout;
use crate::util::usage::UsageTracker;

use super::{CompletionRequest, CompletionResponse, CompletionService};

type KeyLock = Arc<tokio::sync::Mutex<()>>;

/// Obtains replies from the cache, falling back to the backend on a miss.
///
/// Concurrent misses for the same `(seed, fingerprint)` are collapsed: one
/// caller builds the entry while the others wait and then read it.
pub struct CompletionClient {
    service: Arc<dyn CompletionService>,
    cache: Option<Arc<dyn ReplyCache>>,
    usage: UsageTracker,
    timeout: Option<Duration>,
    retry: RetryPolicy,
    in_flight: Mutex<HashMap<(CacheSeed, String), KeyLock>>,
}

impl CompletionClient {
    /// Uncached client with no timeout and no retries.
    pub fn new(service: Arc<dyn CompletionService>) -> Self {
        Self {
            service,
            cache: None,
            usage: UsageTracker::new(),
            timeout: None,
            retry: RetryPolicy::none(),
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    pub fn from_config(service: Arc<dyn CompletionService>, config: &CompletionConfig) -> Self {
        Self::new(service)
            .with_timeout(config.timeout())
            .with_retry(config.retry_policy())
    }

    pub fn with_cache(mut self, cache: Arc<dyn ReplyCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Share a usage tracker with other clients.
    pub fn with_usage_tracker(mut self, usage: UsageTracker) -> Self {
        self.usage = usage;
        self
    }

    pub fn usage(&self) -> &UsageTracker {
        &self.usage
    }

    /// Obtain a reply for `request` under `seed`.
    pub async fn create(
        &self,
        request: &CompletionRequest,
        seed: CacheSeed,
    ) -> Result<CompletionResponse, ConfabError> {
        let cache = match self.cache.as_ref() {
            Some(cache) if !seed.is_disabled() => cache,
            _ => return self.fetch(request).await,
        };

        let fingerprint = request.fingerprint()?;
        if let Some(hit) = self.lookup(cache.as_ref(), seed, &fingerprint)? {
            return Ok(hit);
        }

        let key = (seed, fingerprint.clone());
        let lock = self.key_lock(&key);
        let result = {
            let _guard = lock.lock().await;
            match self.lookup(cache.as_ref(), seed, &fingerprint) {
                Ok(Some(hit)) => Ok(hit),
                Ok(None) => self.build(cache.as_ref(), request, seed, &fingerprint).await,
                Err(err) => Err(err),
            }
        };
        self.release_key(&key, lock);
        result
    }

    fn lookup(
        &self,
        cache: &dyn ReplyCache,
        seed: CacheSeed,
        fingerprint: &str,
    ) -> Result<Option<CompletionResponse>, ConfabError> {
        let Some(entry) = cache.get(seed, fingerprint)? else {
            return Ok(None);
        };
        let response: CompletionResponse = match serde_json::from_str(&entry.response) {
            Ok(response) => response,
            Err(error) => {
                tracing::warn!(fingerprint, %error, "cached reply does not decode, treating as miss");
                return Ok(None);
            }
        };
        tracing::debug!(?seed, fingerprint, "completion cache hit");
        self.usage
            .record(response.model.as_deref(), &response.usage, &response.cost, true);
        Ok(Some(response))
    }

    async fn build(
        &self,
        cache: &dyn ReplyCache,
        request: &CompletionRequest,
        seed: CacheSeed,
        fingerprint: &str,
    ) -> Result<CompletionResponse, ConfabError> {
        let response = self.fetch(request).await?;

        let mut entry = CacheEntry::new(serde_json::to_string(&response)?, response.usage, response.cost);
        entry.model = response.model.clone();
        if let Err(error) = cache.put(seed, fingerprint, &entry) {
            tracing::warn!(?seed, fingerprint, %error, "failed to store completion in cache");
        }
        Ok(response)
    }

    /// Call the backend directly, counting the result as actual usage.
    async fn fetch(&self, request: &CompletionRequest) -> Result<CompletionResponse, ConfabError> {
        let normalized = request.normalized();
        let request = &normalized;
        let service = self.service.as_ref();
        let timeout = self.timeout;
        let response = self
            .retry
            .execute(move || async move {
                match timeout {
                    Some(timeout) => with_timeout(timeout, service.complete(request)).await,
                    None => service.complete(request).await,
                }
            })
            .await?;
        tracing::debug!(service = self.service.name(), "completion fetched from backend");
        self.usage
            .record(response.model.as_deref(), &response.usage, &response.cost, false);
        Ok(response)
    }

    fn key_lock(&self, key: &(CacheSeed, String)) -> KeyLock {
        let mut in_flight = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
        in_flight.entry(key.clone()).or_default().clone()
    }

    fn release_key(&self, key: &(CacheSeed, String), lock: KeyLock) {
        let mut in_flight = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
        // Map entry plus ours: nobody else is waiting on this key.
        if Arc::strong_count(&lock) <= 2 {
            in_flight.remove(key);
        }
    }
}
