//! quotefeed: batched market-data acquisition pipeline.
//!
//! Serves concurrent per-ticker quote requests by coalescing them into
//! batched upstream calls, caching results with volatility- and
//! market-hours-aware expiry, and falling back across providers on failure.
//! All state is in memory; a restart just means a cold cache.

pub mod cli;
pub mod commands;
pub mod config;
pub mod constants;
pub mod error;
pub mod models;
pub mod services;
pub mod worker;

use crate::config::PipelineConfig;
use crate::error::{QuoteError, Result};
use crate::models::{Quote, RequestPriority};
use crate::services::{
    PriceHistoryStore, ProviderChain, QuoteCache, QuoteDispatcher, QuoteProvider,
    SyntheticProvider, YahooProvider,
};
use std::sync::Arc;
use tokio::task::JoinHandle;

/// One fully wired pipeline instance.
///
/// Constructed once at process start; every component is an explicit handle
/// passed in here rather than hidden global state. Clones share the same
/// queue, cache, and history.
#[derive(Clone)]
pub struct QuotePipeline {
    dispatcher: QuoteDispatcher,
    cache: Arc<QuoteCache>,
    history: Arc<PriceHistoryStore>,
    config: PipelineConfig,
}

impl QuotePipeline {
    /// Build the default provider chain: live quote API first, synthetic
    /// fallback last.
    pub fn new(config: PipelineConfig) -> Result<Self> {
        let yahoo = YahooProvider::new(
            config.quote_api_base_url.clone(),
            config.provider_http_timeout,
        )
        .map_err(|e| QuoteError::Config(format!("Failed to create quote provider: {}", e)))?;

        let providers: Vec<Box<dyn QuoteProvider>> =
            vec![Box::new(yahoo), Box::new(SyntheticProvider::new())];

        Ok(Self::with_providers(config, providers))
    }

    /// Build a pipeline over a caller-supplied provider chain.
    pub fn with_providers(config: PipelineConfig, providers: Vec<Box<dyn QuoteProvider>>) -> Self {
        let history = Arc::new(PriceHistoryStore::new(config.history_capacity));
        let chain = Arc::new(ProviderChain::new(providers, Arc::clone(&history)));
        let cache = Arc::new(QuoteCache::new(config.cache_capacity));
        let dispatcher = QuoteDispatcher::new(Arc::clone(&cache), chain, config.clone());

        Self {
            dispatcher,
            cache,
            history,
            config,
        }
    }

    /// Fetch a quote for one ticker. See [`QuoteDispatcher::request_quote`]
    /// for the coalescing and failure semantics.
    pub async fn quote(&self, ticker: &str, priority: RequestPriority) -> Result<Quote> {
        self.dispatcher.request_quote(ticker, priority).await
    }

    /// Spawn the background sweep that expires cache entries independent of
    /// read traffic. Abort the returned handle to stop it.
    pub fn spawn_sweep_worker(&self) -> JoinHandle<()> {
        tokio::spawn(worker::run_sweep_worker(
            Arc::clone(&self.cache),
            Arc::clone(&self.history),
            self.config.sweep_interval,
        ))
    }
}
