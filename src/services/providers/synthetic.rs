use crate::models::Quote;
use crate::services::providers::{ProviderError, QuoteProvider, RetryPolicy};
use async_trait::async_trait;
use rand::Rng;
use std::collections::HashMap;

/// Last-resort provider that fabricates plausible quotes locally.
///
/// The base price is derived from the symbol itself so the same ticker
/// quotes in a stable range across calls, with a small random walk on top.
/// `change_percent` is left at zero for the chain to synthesize from price
/// history. Never fails, so a chain ending in this provider can only
/// exhaust when a batch-wide invariant breaks upstream of it.
pub struct SyntheticProvider;

impl SyntheticProvider {
    pub fn new() -> Self {
        Self
    }

    /// Stable pseudo-price in roughly the $10–$510 range.
    fn base_price(ticker: &str) -> f64 {
        let hash: u64 = ticker
            .bytes()
            .fold(1469598103934665603u64, |acc, b| {
                (acc ^ b as u64).wrapping_mul(1099511628211)
            });
        10.0 + (hash % 50_000) as f64 / 100.0
    }
}

impl Default for SyntheticProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl QuoteProvider for SyntheticProvider {
    fn name(&self) -> &'static str {
        "synthetic"
    }

    async fn fetch_batch(&self, tickers: &[String]) -> Result<HashMap<String, Quote>, ProviderError> {
        let mut rng = rand::thread_rng();

        Ok(tickers
            .iter()
            .map(|ticker| {
                let base = Self::base_price(ticker);
                let drift: f64 = rng.gen_range(-0.005..0.005);
                let price = (base * (1.0 + drift)).max(0.01);

                let mut quote = Quote::basic(ticker.clone(), price, "synthetic");
                quote.volume = Some(rng.gen_range(100_000..5_000_000));
                (ticker.clone(), quote)
            })
            .collect())
    }

    fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::none()
    }
}
