// price-cache/src/lib.rs
//! C2 — Price Cache & Batch Fetcher. A TTL-bounded in-memory cache over
//! `quote_source::QuoteSource`, with a per-code single-flight lock so that
//! N concurrent lookups for the same code issue exactly one upstream call.
//!
//! Coalescing is implemented with double-checked locking rather than a
//! broadcast channel: callers race for a per-code `tokio::sync::Mutex<()>`,
//! and whoever loses the race finds the cache already warm by the time it
//! acquires the lock. This keeps the implementation free of any
//! `Shared`/`OnceCell` plumbing while still giving the "at most one
//! in-flight upstream call per code" guarantee spec.md §4.2 and §5 require.

use std::collections::HashMap;
use std::sync::Mutex as StdMutex;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures_util::future::join_all;
use quote_source::QuoteSource;
use shared_models::Quote;
use tracing::warn;

/// TTL measured from the moment a value was written, not read, per
/// spec.md §4.2.
pub const DEFAULT_TTL: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
struct CacheEntry {
    price: f64,
    source: String,
    fetched_at: chrono::DateTime<Utc>,
}

impl CacheEntry {
    fn into_quote(self, code: &str) -> Quote {
        Quote {
            code: code.to_string(),
            price: self.price,
            source: self.source,
            fetched_at: self.fetched_at,
        }
    }

    fn fresh(&self, ttl: Duration, now: chrono::DateTime<Utc>) -> bool {
        (now - self.fetched_at).to_std().map(|age| age <= ttl).unwrap_or(false)
    }
}

pub struct PriceCache {
    source: QuoteSource,
    ttl: Duration,
    cache: StdMutex<HashMap<String, CacheEntry>>,
    code_locks: StdMutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl PriceCache {
    pub fn new(source: QuoteSource) -> Self {
        Self::with_ttl(source, DEFAULT_TTL)
    }

    pub fn with_ttl(source: QuoteSource, ttl: Duration) -> Self {
        Self {
            source,
            ttl,
            cache: StdMutex::new(HashMap::new()),
            code_locks: StdMutex::new(HashMap::new()),
        }
    }

    fn code_lock(&self, code: &str) -> Arc<tokio::sync::Mutex<()>> {
        self.code_locks
            .lock()
            .unwrap()
            .entry(code.to_string())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }

    fn cached_if_fresh(&self, code: &str, as_of: chrono::DateTime<Utc>) -> Option<Quote> {
        let cache = self.cache.lock().unwrap();
        cache
            .get(code)
            .filter(|entry| entry.fresh(self.ttl, as_of))
            .cloned()
            .map(|entry| entry.into_quote(code))
    }

    fn cached_any(&self, code: &str) -> Option<Quote> {
        self.cache
            .lock()
            .unwrap()
            .get(code)
            .cloned()
            .map(|entry| entry.into_quote(code))
    }

    /// Fetch the price for `code`. When `force` is false a cache hit within
    /// the TTL is returned without touching the network. When every
    /// provider fails, a stale cached value is returned if one exists,
    /// otherwise a zero-price sentinel tagged `"unavailable"`.
    pub async fn get(&self, code: &str, force: bool) -> Quote {
        let requested_at = Utc::now();

        if !force {
            if let Some(quote) = self.cached_if_fresh(code, requested_at) {
                return quote;
            }
        }

        let lock = self.code_lock(code);
        let _guard = lock.lock().await;

        // Someone else may have refreshed this code while we waited for
        // the per-code lock — that satisfies our own request too.
        if let Some(entry) = self.cache.lock().unwrap().get(code).cloned() {
            if entry.fetched_at >= requested_at || (!force && entry.fresh(self.ttl, requested_at)) {
                return entry.into_quote(code);
            }
        }

        match self.source.fetch(code).await {
            Ok(raw) => {
                let entry = CacheEntry {
                    price: raw.price,
                    source: raw.source,
                    fetched_at: Utc::now(),
                };
                self.cache.lock().unwrap().insert(code.to_string(), entry.clone());
                entry.into_quote(code)
            }
            Err(err) => {
                warn!(code, %err, "quote source exhausted, falling back");
                if let Some(stale) = self.cached_any(code) {
                    Quote {
                        source: "stale".to_string(),
                        ..stale
                    }
                } else {
                    Quote {
                        code: code.to_string(),
                        price: 0.0,
                        source: "unavailable".to_string(),
                        fetched_at: Utc::now(),
                    }
                }
            }
        }
    }

    /// Fan `get` out over `codes` concurrently; results preserve the input
    /// order. Individual failures never fail the batch — they surface as
    /// stale/unavailable quotes, per spec.md §4.2.
    pub async fn batch(&self, codes: &[String], force: bool) -> Vec<Quote> {
        join_all(codes.iter().map(|code| self.get(code, force))).await
    }

    pub fn invalidate(&self, code: &str) {
        self.cache.lock().unwrap().remove(code);
    }

    pub fn invalidate_all(&self) {
        self.cache.lock().unwrap().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use quote_source::{Error as QuoteError, QuoteProvider, QuoteSource, RawQuote};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingProvider {
        calls: Arc<AtomicUsize>,
        price: f64,
    }

    #[async_trait]
    impl QuoteProvider for CountingProvider {
        fn tag(&self) -> &str {
            "counting"
        }

        async fn fetch_one(&self, _code: &str) -> Result<RawQuote, QuoteError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            // Yield so concurrent callers actually interleave in the test.
            tokio::task::yield_now().await;
            Ok(RawQuote {
                price: self.price,
                source: "counting".to_string(),
            })
        }
    }

    fn cache_with(calls: Arc<AtomicUsize>, price: f64) -> PriceCache {
        let source = QuoteSource::new(vec![Box::new(CountingProvider { calls, price })]);
        PriceCache::with_ttl(source, Duration::from_secs(30))
    }

    #[tokio::test]
    async fn concurrent_lookups_for_the_same_code_coalesce() {
        let calls = Arc::new(AtomicUsize::new(0));
        let cache = Arc::new(cache_with(calls.clone(), 42.0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let cache = cache.clone();
            handles.push(tokio::spawn(async move { cache.get("600000", false).await }));
        }
        for h in handles {
            let quote = h.await.unwrap();
            assert_eq!(quote.price, 42.0);
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn force_refresh_always_hits_the_provider() {
        let calls = Arc::new(AtomicUsize::new(0));
        let cache = cache_with(calls.clone(), 1.0);

        cache.get("600000", false).await;
        cache.get("600000", false).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1, "second call should be served from cache");

        cache.get("600000", true).await;
        assert_eq!(calls.load(Ordering::SeqCst), 2, "force=true must always refresh");
    }

    #[tokio::test]
    async fn batch_preserves_input_order() {
        let calls = Arc::new(AtomicUsize::new(0));
        let cache = cache_with(calls, 7.0);
        let codes = vec!["600000".to_string(), "000001".to_string(), "300750".to_string()];
        let results = cache.batch(&codes, false).await;
        let result_codes: Vec<_> = results.iter().map(|q| q.code.clone()).collect();
        assert_eq!(result_codes, codes);
    }

    #[tokio::test]
    async fn total_failure_without_prior_cache_yields_unavailable_sentinel() {
        struct AlwaysFails;
        #[async_trait]
        impl QuoteProvider for AlwaysFails {
            fn tag(&self) -> &str {
                "dead"
            }
            async fn fetch_one(&self, code: &str) -> Result<RawQuote, QuoteError> {
                Err(QuoteError::AllProvidersFailed { code: code.to_string() })
            }
        }
        let source = QuoteSource::new(vec![Box::new(AlwaysFails)]);
        let cache = PriceCache::new(source);
        let quote = cache.get("600000", false).await;
        assert_eq!(quote.price, 0.0);
        assert_eq!(quote.source, "unavailable");
    }

    #[tokio::test]
    async fn invalidate_forces_a_refetch() {
        let calls = Arc::new(AtomicUsize::new(0));
        let cache = cache_with(calls.clone(), 1.0);
        cache.get("600000", false).await;
        cache.invalidate("600000");
        cache.get("600000", false).await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
