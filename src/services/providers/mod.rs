//! Quote providers and the fallback chain.
//!
//! A provider either returns a usable result set for a batch of tickers or
//! signals that it cannot serve. The chain walks providers in a fixed order,
//! handing whatever is still unresolved to the next one; a single ticker's
//! quote always comes wholly from one provider.

mod synthetic;
mod yahoo;

pub use synthetic::SyntheticProvider;
pub use yahoo::YahooProvider;

use crate::models::Quote;
use crate::services::history::PriceHistoryStore;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error as ThisError;
use tokio::time::sleep;
use tracing::{debug, info, warn};

/// Failures internal to a single provider. These never cross the chain
/// boundary; exhaustion of the whole chain is what callers see.
#[derive(ThisError, Debug)]
pub enum ProviderError {
    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Unexpected status {0}: {1}")]
    Status(u16, String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("No data returned")]
    NoData,
}

/// Retry schedule applied around one provider's batch call. Replaces the
/// scattered sleep-then-retry the fetch paths used to carry.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub backoff_multiplier: u32,
}

impl RetryPolicy {
    /// Two attempts with a short pause; suits a flaky but fast live API.
    pub fn standard() -> Self {
        Self {
            max_attempts: 2,
            initial_backoff: Duration::from_millis(200),
            backoff_multiplier: 2,
        }
    }

    /// Single attempt, no backoff.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            initial_backoff: Duration::ZERO,
            backoff_multiplier: 1,
        }
    }

    fn backoff_for_attempt(&self, attempt: u32) -> Duration {
        self.initial_backoff * self.backoff_multiplier.saturating_pow(attempt)
    }
}

/// A single quote source.
#[async_trait]
pub trait QuoteProvider: Send + Sync {
    fn name(&self) -> &'static str;

    /// Fetch quotes for a batch of tickers in one upstream operation.
    /// Tickers absent from the returned map are treated as unserved and
    /// offered to the next provider in the chain.
    async fn fetch_batch(&self, tickers: &[String]) -> Result<HashMap<String, Quote>, ProviderError>;

    /// Retry schedule the chain applies around this provider.
    fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::standard()
    }
}

/// Ordered provider list plus the history store that backfills percent
/// changes and records every observed price.
pub struct ProviderChain {
    providers: Vec<Box<dyn QuoteProvider>>,
    history: Arc<PriceHistoryStore>,
}

impl ProviderChain {
    pub fn new(providers: Vec<Box<dyn QuoteProvider>>, history: Arc<PriceHistoryStore>) -> Self {
        Self { providers, history }
    }

    /// Resolve a batch of tickers, trying providers strictly in order.
    /// Tickers no provider could serve are simply absent from the result;
    /// the dispatcher maps those to per-request failures.
    pub async fn fetch_batch(&self, tickers: &[String]) -> HashMap<String, Quote> {
        let mut resolved: HashMap<String, Quote> = HashMap::new();
        let mut remaining: Vec<String> = tickers.to_vec();

        for provider in &self.providers {
            if remaining.is_empty() {
                break;
            }

            match self.fetch_with_retry(provider.as_ref(), &remaining).await {
                Ok(quotes) => {
                    remaining.retain(|ticker| !quotes.contains_key(ticker));
                    if !remaining.is_empty() {
                        debug!(
                            provider = provider.name(),
                            unserved = remaining.len(),
                            "Provider served batch partially"
                        );
                    }
                    resolved.extend(quotes);
                }
                Err(e) => {
                    warn!(
                        provider = provider.name(),
                        tickers = remaining.len(),
                        error = %e,
                        "Provider failed for batch, falling back"
                    );
                }
            }
        }

        if !remaining.is_empty() {
            warn!(tickers = ?remaining, "All providers exhausted for tickers");
        }

        // Backfill missing percent changes from history, then record every
        // observed price so the next synthesis has something to work with.
        for quote in resolved.values_mut() {
            if quote.change_percent == 0.0 {
                if let Some(change) = self
                    .history
                    .change_percent_from_history(&quote.ticker, quote.price)
                    .await
                {
                    quote.change_percent = change;
                }
            }
        }
        for quote in resolved.values() {
            self.history.record(&quote.ticker, quote.price).await;
        }

        resolved
    }

    async fn fetch_with_retry(
        &self,
        provider: &dyn QuoteProvider,
        tickers: &[String],
    ) -> Result<HashMap<String, Quote>, ProviderError> {
        let policy = provider.retry_policy();
        let mut last_error = ProviderError::NoData;

        for attempt in 0..policy.max_attempts {
            if attempt > 0 {
                let backoff = policy.backoff_for_attempt(attempt - 1);
                debug!(
                    provider = provider.name(),
                    attempt = attempt + 1,
                    backoff_ms = backoff.as_millis() as u64,
                    "Retrying provider after backoff"
                );
                sleep(backoff).await;
            }

            match provider.fetch_batch(tickers).await {
                Ok(quotes) if quotes.is_empty() => {
                    last_error = ProviderError::NoData;
                }
                Ok(quotes) => {
                    info!(
                        provider = provider.name(),
                        requested = tickers.len(),
                        served = quotes.len(),
                        "Provider served batch"
                    );
                    return Ok(quotes);
                }
                Err(e) => {
                    last_error = e;
                }
            }
        }

        Err(last_error)
    }
}
