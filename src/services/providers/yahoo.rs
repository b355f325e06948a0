use crate::models::Quote;
use crate::services::providers::{ProviderError, QuoteProvider, RetryPolicy};
use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, info};

// The quote endpoint rejects requests without a browser-looking agent.
const USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) \
     AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

#[derive(Debug, Deserialize)]
struct QuoteApiResponse {
    #[serde(rename = "quoteResponse")]
    quote_response: QuoteResponseBody,
}

#[derive(Debug, Deserialize)]
struct QuoteResponseBody {
    result: Vec<QuoteResult>,
}

#[derive(Debug, Deserialize)]
struct QuoteResult {
    symbol: String,
    #[serde(rename = "regularMarketPrice")]
    regular_market_price: Option<f64>,
    #[serde(rename = "regularMarketChangePercent")]
    regular_market_change_percent: Option<f64>,
    #[serde(rename = "regularMarketVolume")]
    regular_market_volume: Option<u64>,
    #[serde(rename = "marketCap")]
    market_cap: Option<f64>,
    #[serde(rename = "trailingPE")]
    trailing_pe: Option<f64>,
    #[serde(rename = "regularMarketDayHigh")]
    regular_market_day_high: Option<f64>,
    #[serde(rename = "regularMarketDayLow")]
    regular_market_day_low: Option<f64>,
    #[serde(rename = "fiftyTwoWeekHigh")]
    fifty_two_week_high: Option<f64>,
    #[serde(rename = "fiftyTwoWeekLow")]
    fifty_two_week_low: Option<f64>,
}

/// Primary live provider: Yahoo-style batched quote endpoint. One GET serves
/// the whole batch via a comma-joined `symbols` parameter.
pub struct YahooProvider {
    base_url: String,
    client: reqwest::Client,
}

impl YahooProvider {
    /// Build the provider with a bounded HTTP timeout. The timeout is kept
    /// shorter than the pipeline's per-request deadline so a hung upstream
    /// fails over before callers give up.
    pub fn new(base_url: String, http_timeout: Duration) -> Result<Self, ProviderError> {
        let base_url = base_url.trim().trim_end_matches('/').to_string();

        let client = reqwest::Client::builder()
            .timeout(http_timeout)
            .build()
            .map_err(|e| ProviderError::Http(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { base_url, client })
    }

    fn parse_result(&self, result: QuoteResult) -> Result<Quote, ProviderError> {
        let price = result
            .regular_market_price
            .ok_or_else(|| ProviderError::MissingField(format!("{}: regularMarketPrice", result.symbol)))?;

        if price <= 0.0 {
            return Err(ProviderError::Parse(format!(
                "{}: non-positive price {}",
                result.symbol, price
            )));
        }

        Ok(Quote {
            ticker: result.symbol,
            price,
            change_percent: result.regular_market_change_percent.unwrap_or(0.0),
            volume: result.regular_market_volume,
            market_cap: result.market_cap,
            pe_ratio: result.trailing_pe,
            day_high: result.regular_market_day_high,
            day_low: result.regular_market_day_low,
            year_high: result.fifty_two_week_high,
            year_low: result.fifty_two_week_low,
            fetched_at: Utc::now(),
            source: "yahoo".to_string(),
        })
    }
}

#[async_trait]
impl QuoteProvider for YahooProvider {
    fn name(&self) -> &'static str {
        "yahoo"
    }

    async fn fetch_batch(&self, tickers: &[String]) -> Result<HashMap<String, Quote>, ProviderError> {
        let symbols = tickers.join(",");
        let url = format!("{}/v7/finance/quote", self.base_url);

        debug!(symbols = %symbols, "Fetching batch from quote API");

        let response = self
            .client
            .get(&url)
            .query(&[("symbols", symbols.as_str())])
            .header(reqwest::header::USER_AGENT, USER_AGENT)
            .send()
            .await
            .map_err(|e| ProviderError::Http(format!("Request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unable to read response body".to_string());
            return Err(ProviderError::Status(status, body));
        }

        let body: QuoteApiResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::Parse(format!("Failed to parse response: {}", e)))?;

        let mut quotes = HashMap::new();
        for result in body.quote_response.result {
            // A symbol without a price is unserved, not a batch failure;
            // the chain will offer it to the next provider.
            match self.parse_result(result) {
                Ok(quote) => {
                    quotes.insert(quote.ticker.clone(), quote);
                }
                Err(e) => {
                    debug!(error = %e, "Skipping unusable quote result");
                }
            }
        }

        if quotes.is_empty() {
            return Err(ProviderError::NoData);
        }

        info!(requested = tickers.len(), served = quotes.len(), "Quote API batch completed");
        Ok(quotes)
    }

    fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::standard()
    }
}
