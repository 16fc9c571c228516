// quote-source/src/ashare.rs
//! A-share quote provider. Mirrors the two quote endpoints commonly used by
//! Chinese retail terminals: a semicolon/comma framed `var hq_str_xxx="..."`
//! response (Sina-style) and a tilde-framed `v_xxx="..."` response
//! (Tencent-style). Both variants are exposed through the same provider,
//! selected by [`Variant`], so a deployment can order them as primary/
//! fallback the way spec.md §4.1 describes.

use async_trait::async_trait;

use crate::{Error, QuoteProvider, RawQuote};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Variant {
    Sina,
    Tencent,
}

impl Variant {
    fn tag(self) -> &'static str {
        match self {
            Variant::Sina => "sina",
            Variant::Tencent => "tencent",
        }
    }
}

pub struct AShareProvider {
    client: reqwest::Client,
    base_url: String,
    variant: Variant,
}

impl AShareProvider {
    pub fn new(base_url: impl Into<String>, variant: Variant) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            variant,
        }
    }

    /// `60x`/`68x` trade on the Shanghai exchange (`sh`), `00x`/`30x` on
    /// Shenzhen (`sz`). Anything else is rejected before a request is made.
    fn exchange_prefix(code: &str) -> Result<&'static str, String> {
        if code.len() != 6 || !code.chars().all(|c| c.is_ascii_digit()) {
            return Err(format!("not a 6-digit A-share code: {code}"));
        }
        match &code[0..2] {
            "60" | "68" => Ok("sh"),
            "00" | "30" => Ok("sz"),
            other => Err(format!("unrecognized A-share exchange prefix: {other}")),
        }
    }

    fn symbol(&self, code: &str) -> Result<String, Error> {
        let prefix = Self::exchange_prefix(code).map_err(|detail| Error::Malformed {
            provider: self.variant.tag().to_string(),
            code: code.to_string(),
            detail,
        })?;
        Ok(format!("{prefix}{code}"))
    }

    fn parse(&self, code: &str, body: &str) -> Result<f64, Error> {
        let malformed = |detail: String| Error::Malformed {
            provider: self.variant.tag().to_string(),
            code: code.to_string(),
            detail,
        };

        let quoted = body
            .split('"')
            .nth(1)
            .ok_or_else(|| malformed("no quoted payload in response".into()))?;

        if quoted.is_empty() {
            return Err(malformed("empty quote payload — unknown or delisted code".into()));
        }

        let price_field = match self.variant {
            // var hq_str_sh600000="name,open,prev_close,price,high,low,...";
            Variant::Sina => quoted.split(',').nth(3),
            // v_sh600000="1~name~600000~price~...";
            Variant::Tencent => quoted.split('~').nth(3),
        };

        let raw = price_field.ok_or_else(|| malformed("payload missing price field".into()))?;
        raw.parse::<f64>()
            .map_err(|e| malformed(format!("price field {raw:?} did not parse: {e}")))
    }
}

#[async_trait]
impl QuoteProvider for AShareProvider {
    fn tag(&self) -> &str {
        self.variant.tag()
    }

    async fn fetch_one(&self, code: &str) -> Result<RawQuote, Error> {
        let symbol = self.symbol(code)?;
        let url = format!("{}/{}", self.base_url.trim_end_matches('/'), symbol);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|source| Error::Request {
                provider: self.variant.tag().to_string(),
                source,
            })?;

        let body = response.text().await.map_err(|source| Error::Request {
            provider: self.variant.tag().to_string(),
            source,
        })?;

        let price = self.parse(code, &body)?;
        Ok(RawQuote {
            price,
            source: self.variant.tag().to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exchange_prefix_routes_shanghai_and_shenzhen() {
        assert_eq!(AShareProvider::exchange_prefix("600000").unwrap(), "sh");
        assert_eq!(AShareProvider::exchange_prefix("688981").unwrap(), "sh");
        assert_eq!(AShareProvider::exchange_prefix("000001").unwrap(), "sz");
        assert_eq!(AShareProvider::exchange_prefix("300750").unwrap(), "sz");
        assert!(AShareProvider::exchange_prefix("999999").is_err());
        assert!(AShareProvider::exchange_prefix("60000").is_err());
    }

    #[test]
    fn parses_sina_style_payload() {
        let provider = AShareProvider::new("http://example.invalid", Variant::Sina);
        let body = r#"var hq_str_sh600000="浦发银行,10.00,9.98,10.05,10.10,9.90,10.04,10.05,123456,0,0,0,0,0,0";"#;
        assert_eq!(provider.parse("600000", body).unwrap(), 10.05);
    }

    #[test]
    fn parses_tencent_style_payload() {
        let provider = AShareProvider::new("http://example.invalid", Variant::Tencent);
        let body = r#"v_sh600000="1~浦发银行~600000~10.07~10.00~9.98~123456~0~0";"#;
        assert_eq!(provider.parse("600000", body).unwrap(), 10.07);
    }

    #[test]
    fn rejects_empty_payload() {
        let provider = AShareProvider::new("http://example.invalid", Variant::Sina);
        let body = r#"var hq_str_sh999999="";"#;
        assert!(provider.parse("999999", body).is_err());
    }
}
