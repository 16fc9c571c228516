// quote-source/src/lib.rs
//! C1 — Quote Source. Stateless providers that turn an instrument code into
//! a `(price, source_tag)` pair. No caching, no coalescing: that is C2's job
//! (`price-cache`), which composes a `QuoteSource` over an ordered list of
//! these providers.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, warn};

mod ashare;
mod forex;

pub use ashare::{AShareProvider, Variant};
pub use forex::ForexProvider;

/// Wall-clock budget for a single provider call, per spec.md §4.1.
pub const PROVIDER_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Error)]
pub enum Error {
    #[error("provider {provider} timed out fetching {code}")]
    Timeout { provider: String, code: String },
    #[error("provider {provider} request failed: {source}")]
    Request {
        provider: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("provider {provider} returned a malformed payload for {code}: {detail}")]
    Malformed {
        provider: String,
        code: String,
        detail: String,
    },
    #[error("no quote provider configured for this market")]
    NoProviders,
    #[error("all providers failed for {code}")]
    AllProvidersFailed { code: String },
}

/// A successful fetch: price plus the human-readable tag of whichever
/// provider answered.
#[derive(Debug, Clone, PartialEq)]
pub struct RawQuote {
    pub price: f64,
    pub source: String,
}

/// One upstream quote provider. Implementations do network I/O only and
/// hold no per-code state — the cache layer owns that.
#[async_trait]
pub trait QuoteProvider: Send + Sync {
    /// Human tag attached to a successful quote (`"sina"`, `"tencent"`, …).
    fn tag(&self) -> &str;

    async fn fetch_one(&self, code: &str) -> Result<RawQuote, Error>;
}

/// An ordered cascade of providers: the first one tried is the primary,
/// later ones are fallbacks. Failure of one provider — including a timeout
/// or a malformed payload — moves on to the next.
pub struct QuoteSource {
    providers: Vec<Box<dyn QuoteProvider>>,
}

impl QuoteSource {
    pub fn new(providers: Vec<Box<dyn QuoteProvider>>) -> Self {
        Self { providers }
    }

    /// Try every provider in order, each bounded by [`PROVIDER_TIMEOUT`].
    /// Returns the first success; `Error::AllProvidersFailed` only once
    /// every provider has been tried.
    pub async fn fetch(&self, code: &str) -> Result<RawQuote, Error> {
        if self.providers.is_empty() {
            return Err(Error::NoProviders);
        }

        for provider in &self.providers {
            let attempt = tokio::time::timeout(PROVIDER_TIMEOUT, provider.fetch_one(code)).await;
            match attempt {
                Ok(Ok(quote)) => return Ok(quote),
                Ok(Err(err)) => {
                    warn!(provider = provider.tag(), code, %err, "quote provider failed");
                }
                Err(_) => {
                    debug!(provider = provider.tag(), code, "quote provider timed out");
                }
            }
        }

        Err(Error::AllProvidersFailed {
            code: code.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FlakyProvider {
        tag: String,
        fails: bool,
    }

    #[async_trait]
    impl QuoteProvider for FlakyProvider {
        fn tag(&self) -> &str {
            &self.tag
        }

        async fn fetch_one(&self, _code: &str) -> Result<RawQuote, Error> {
            if self.fails {
                Err(Error::Malformed {
                    provider: self.tag.clone(),
                    code: "x".into(),
                    detail: "boom".into(),
                })
            } else {
                Ok(RawQuote {
                    price: 10.5,
                    source: self.tag.clone(),
                })
            }
        }
    }

    #[tokio::test]
    async fn cascades_to_the_next_provider_on_failure() {
        let source = QuoteSource::new(vec![
            Box::new(FlakyProvider {
                tag: "primary".into(),
                fails: true,
            }),
            Box::new(FlakyProvider {
                tag: "fallback".into(),
                fails: false,
            }),
        ]);

        let quote = source.fetch("600000").await.unwrap();
        assert_eq!(quote.source, "fallback");
    }

    #[tokio::test]
    async fn fails_when_every_provider_fails() {
        let source = QuoteSource::new(vec![Box::new(FlakyProvider {
            tag: "only".into(),
            fails: true,
        })]);

        let err = source.fetch("600000").await.unwrap_err();
        assert!(matches!(err, Error::AllProvidersFailed { .. }));
    }

    #[tokio::test]
    async fn no_providers_is_reported_distinctly() {
        let source = QuoteSource::new(vec![]);
        let err = source.fetch("600000").await.unwrap_err();
        assert!(matches!(err, Error::NoProviders));
    }
}
