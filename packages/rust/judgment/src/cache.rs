//! In-memory reply cache keyed by a prompt hash.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use tokio::sync::Mutex;
use tracing::debug;

use bitfunnel_shared::Result;

use crate::client::{JudgmentClient, JudgmentReply, JudgmentRequest};

/// Compute the cache key for a request.
fn request_hash(request: &JudgmentRequest) -> String {
    let mut hasher = Sha256::new();
    hasher.update(request.model.as_deref().unwrap_or("").as_bytes());
    hasher.update([0u8]);
    hasher.update(request.temperature.to_bits().to_le_bytes());
    hasher.update(request.max_tokens.to_le_bytes());
    hasher.update([request.shape as u8]);
    hasher.update(request.system.as_bytes());
    hasher.update([0u8]);
    hasher.update(request.prompt.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Hit/miss counters of a [`CachedJudgment`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
}

/// Wraps a client and answers identical requests from memory.
///
/// Failed calls are not cached. Requests marked uncached always reach the
/// inner client and leave the cache untouched.
pub struct CachedJudgment {
    inner: Arc<dyn JudgmentClient>,
    entries: Mutex<HashMap<String, JudgmentReply>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl CachedJudgment {
    pub fn new(inner: Arc<dyn JudgmentClient>) -> Self {
        Self {
            inner,
            entries: Mutex::new(HashMap::new()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }
}

#[async_trait]
impl JudgmentClient for CachedJudgment {
    async fn submit(&self, request: &JudgmentRequest) -> Result<JudgmentReply> {
        if !request.cacheable {
            return self.inner.submit(request).await;
        }
        let key = request_hash(request);

        if let Some(cached) = self.entries.lock().await.get(&key) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            debug!(key = %&key[..12], "judgment cache hit");
            return Ok(JudgmentReply {
                cached: true,
                ..cached.clone()
            });
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        let reply = self.inner.submit(request).await?;
        self.entries.lock().await.insert(key, reply.clone());
        Ok(reply)
    }

    fn provider_name(&self) -> &'static str {
        self.inner.provider_name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::ResponseShape;
    use bitfunnel_shared::{FunnelError, StageSettings};
    use std::sync::atomic::AtomicUsize;

    struct Counting {
        calls: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl JudgmentClient for Counting {
        async fn submit(&self, request: &JudgmentRequest) -> Result<JudgmentReply> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(FunnelError::transport("down"));
            }
            Ok(JudgmentReply {
                text: format!("echo: {}", request.prompt),
                model: "m".into(),
                tokens_in: 10,
                tokens_out: 5,
                latency_ms: 1,
                cached: false,
            })
        }

        fn provider_name(&self) -> &'static str {
            "counting"
        }
    }

    fn request(prompt: &str) -> JudgmentRequest {
        JudgmentRequest::new(
            "system",
            prompt,
            ResponseShape::Object,
            &StageSettings {
                model: None,
                temperature: 0.3,
                max_tokens: 50,
            },
        )
    }

    #[test]
    fn hash_is_deterministic_and_prompt_sensitive() {
        assert_eq!(request_hash(&request("a")), request_hash(&request("a")));
        assert_ne!(request_hash(&request("a")), request_hash(&request("b")));

        let mut hotter = request("a");
        hotter.temperature = 0.8;
        assert_ne!(request_hash(&request("a")), request_hash(&hotter));
    }

    #[tokio::test]
    async fn identical_requests_hit_the_cache() {
        let inner = Arc::new(Counting {
            calls: AtomicUsize::new(0),
            fail: false,
        });
        let cache = CachedJudgment::new(inner.clone());

        let first = cache.submit(&request("same")).await.unwrap();
        let second = cache.submit(&request("same")).await.unwrap();
        cache.submit(&request("other")).await.unwrap();

        assert!(!first.cached);
        assert!(second.cached);
        assert_eq!(second.text, first.text);
        assert_eq!(inner.calls.load(Ordering::SeqCst), 2);
        assert_eq!(cache.stats(), CacheStats { hits: 1, misses: 2 });
    }

    #[tokio::test]
    async fn uncached_requests_always_reach_the_client() {
        let inner = Arc::new(Counting {
            calls: AtomicUsize::new(0),
            fail: false,
        });
        let cache = CachedJudgment::new(inner.clone());

        let first = cache.submit(&request("fresh").uncached()).await.unwrap();
        let second = cache.submit(&request("fresh").uncached()).await.unwrap();

        assert!(!first.cached && !second.cached);
        assert_eq!(inner.calls.load(Ordering::SeqCst), 2);
        assert_eq!(cache.stats(), CacheStats::default());

        // An uncached call does not seed the cache for cacheable ones.
        assert!(!cache.submit(&request("fresh")).await.unwrap().cached);
    }

    #[tokio::test]
    async fn failures_are_not_cached() {
        let inner = Arc::new(Counting {
            calls: AtomicUsize::new(0),
            fail: true,
        });
        let cache = CachedJudgment::new(inner.clone());

        assert!(cache.submit(&request("x")).await.is_err());
        assert!(cache.submit(&request("x")).await.is_err());
        assert_eq!(inner.calls.load(Ordering::SeqCst), 2);
    }
}
