use crate::catalog::AssetSymbol;
use crate::types::LastPriceResponse;
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use tracing::debug;
use url::Url;

/// Current price of an asset in a quote currency.
#[async_trait]
pub trait PriceSource: Send + Sync {
    async fn get_price(&self, asset: &AssetSymbol, quote: &str) -> Result<f64>;
}

/// CEX.IO `last_price` endpoint.
pub struct CexPriceSource {
    client: Client,
    base_url: String,
}

impl CexPriceSource {
    pub fn new(base_url: &str) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    fn endpoint(&self, asset: &AssetSymbol, quote: &str) -> Result<Url> {
        let mut url = Url::parse(&self.base_url).context("Invalid PRICE_API_URL")?;
        url.path_segments_mut()
            .map_err(|_| anyhow!("PRICE_API_URL cannot be a base URL"))?
            .extend(["last_price", asset.as_str(), quote]);
        Ok(url)
    }
}

#[async_trait]
impl PriceSource for CexPriceSource {
    async fn get_price(&self, asset: &AssetSymbol, quote: &str) -> Result<f64> {
        let url = self.endpoint(asset, quote)?;
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .with_context(|| format!("Price request for {} failed", asset))?
            .error_for_status()
            .with_context(|| format!("Price API rejected {}", asset))?;

        let body: LastPriceResponse = resp
            .json()
            .await
            .with_context(|| format!("Malformed price response for {}", asset))?;
        debug!("Price {} {}/{}", body.lprice, asset, quote);

        parse_price(&body)
    }
}

fn parse_price(body: &LastPriceResponse) -> Result<f64> {
    if let Some(err) = &body.error {
        return Err(anyhow!("Price API error: {}", err));
    }
    let price = body
        .lprice
        .parse::<f64>()
        .with_context(|| format!("Invalid price {:?}", body.lprice))?;
    if !price.is_finite() || price < 0.0 {
        return Err(anyhow!("Invalid price {}", price));
    }
    Ok(price)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_last_price_url() {
        let source = CexPriceSource::new("https://cex.io/api/");
        let url = source.endpoint(&AssetSymbol::from_stored("BTC"), "USD").unwrap();
        assert_eq!(url.as_str(), "https://cex.io/api/last_price/BTC/USD");
    }

    #[test]
    fn parses_string_price() {
        let body: LastPriceResponse =
            serde_json::from_str(r#"{"lprice":"51000.5","curr1":"BTC","curr2":"USD"}"#).unwrap();
        assert_eq!(parse_price(&body).unwrap(), 51000.5);
    }

    #[test]
    fn error_payload_is_an_error() {
        let body: LastPriceResponse =
            serde_json::from_str(r#"{"error":"Invalid Symbols Pair"}"#).unwrap();
        assert!(parse_price(&body).is_err());

        let body: LastPriceResponse = serde_json::from_str(r#"{"lprice":"n/a"}"#).unwrap();
        assert!(parse_price(&body).is_err());
    }
}
