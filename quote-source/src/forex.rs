// quote-source/src/forex.rs
//! Forex quote provider: accepts a symbol like `EURUSD` or `XAUUSD`, hits a
//! JSON FX quote endpoint, and returns the mid price (or the bid/ask
//! midpoint when the upstream does not publish one directly).

use async_trait::async_trait;
use serde::Deserialize;

use crate::{Error, QuoteProvider, RawQuote};

const TAG: &str = "fx_quote";

#[derive(Debug, Deserialize)]
struct FxResponse {
    mid: Option<f64>,
    bid: Option<f64>,
    ask: Option<f64>,
}

impl FxResponse {
    fn mid_price(&self) -> Option<f64> {
        self.mid.or_else(|| match (self.bid, self.ask) {
            (Some(bid), Some(ask)) => Some((bid + ask) / 2.0),
            _ => None,
        })
    }
}

pub struct ForexProvider {
    client: reqwest::Client,
    base_url: String,
}

impl ForexProvider {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }

    fn validate_symbol(symbol: &str) -> Result<(), String> {
        if symbol.len() != 6 || !symbol.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(format!("not a 6-letter forex symbol: {symbol}"));
        }
        Ok(())
    }
}

#[async_trait]
impl QuoteProvider for ForexProvider {
    fn tag(&self) -> &str {
        TAG
    }

    async fn fetch_one(&self, code: &str) -> Result<RawQuote, Error> {
        let symbol = code.to_ascii_uppercase();
        Self::validate_symbol(&symbol).map_err(|detail| Error::Malformed {
            provider: TAG.to_string(),
            code: code.to_string(),
            detail,
        })?;

        let url = format!("{}/{}", self.base_url.trim_end_matches('/'), symbol);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|source| Error::Request {
                provider: TAG.to_string(),
                source,
            })?;

        let parsed: FxResponse = response.json().await.map_err(|source| Error::Request {
            provider: TAG.to_string(),
            source,
        })?;

        let price = parsed.mid_price().ok_or_else(|| Error::Malformed {
            provider: TAG.to_string(),
            code: code.to_string(),
            detail: "response carried neither mid nor bid/ask".into(),
        })?;

        Ok(RawQuote {
            price,
            source: TAG.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mid_price_prefers_explicit_mid() {
        let fx = FxResponse {
            mid: Some(1.1),
            bid: Some(1.0),
            ask: Some(1.2),
        };
        assert_eq!(fx.mid_price(), Some(1.1));
    }

    #[test]
    fn mid_price_falls_back_to_bid_ask_average() {
        let fx = FxResponse {
            mid: None,
            bid: Some(1.0980),
            ask: Some(1.1020),
        };
        assert_eq!(fx.mid_price(), Some(1.1));
    }

    #[test]
    fn validate_symbol_rejects_wrong_length() {
        assert!(ForexProvider::validate_symbol("EURUSD").is_ok());
        assert!(ForexProvider::validate_symbol("XAUUSD").is_ok());
        assert!(ForexProvider::validate_symbol("EUR").is_err());
        assert!(ForexProvider::validate_symbol("EU12SD").is_err());
    }
}
