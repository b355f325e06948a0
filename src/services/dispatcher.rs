//! Request coalescing and batch dispatch.
//!
//! The dispatcher is the pipeline's entry point. Concurrent quote requests
//! land in one pending queue; batches form when the queue reaches the batch
//! size or a delay timer fires, and a single dispatch cycle at a time drives
//! the provider chain. All queue mutation and batch formation happens under
//! one mutex, so no two cycles can interleave.

use crate::config::PipelineConfig;
use crate::constants::MAX_TICKER_LEN;
use crate::error::QuoteError;
use crate::models::{Quote, RequestPriority};
use crate::services::cache::QuoteCache;
use crate::services::providers::ProviderChain;
use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{oneshot, Mutex};
use tokio::time::sleep;
use tracing::{debug, info, warn};

/// One caller's pending ask, resolved exactly once.
struct PendingRequest {
    id: u64,
    ticker: String,
    priority: RequestPriority,
    enqueued_at: Instant,
    tx: oneshot::Sender<Result<Quote, QuoteError>>,
}

struct DispatchState {
    queue: VecDeque<PendingRequest>,
    /// Exactly one dispatch cycle may run at a time
    in_flight: bool,
    /// A delayed-dispatch timer is armed
    timer_armed: bool,
    /// Invalidates stale timer tasks after the timer is superseded
    timer_generation: u64,
}

struct Inner {
    state: Mutex<DispatchState>,
    cache: Arc<QuoteCache>,
    chain: Arc<ProviderChain>,
    config: PipelineConfig,
    next_id: AtomicU64,
}

/// Coalescing batch dispatcher. Cheap to clone; clones share the queue.
#[derive(Clone)]
pub struct QuoteDispatcher {
    inner: Arc<Inner>,
}

impl QuoteDispatcher {
    pub fn new(cache: Arc<QuoteCache>, chain: Arc<ProviderChain>, config: PipelineConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(DispatchState {
                    queue: VecDeque::new(),
                    in_flight: false,
                    timer_armed: false,
                    timer_generation: 0,
                }),
                cache,
                chain,
                config,
                next_id: AtomicU64::new(1),
            }),
        }
    }

    /// Request a quote. Returns immediately on a valid cache hit; otherwise
    /// the request joins the pending queue and resolves when its batch
    /// completes, or fails with `Timeout`/`QueueFull`/`ProviderExhausted`.
    ///
    /// Concurrent calls for the same ticker coalesce into one upstream fetch.
    pub async fn request_quote(
        &self,
        ticker: &str,
        priority: RequestPriority,
    ) -> Result<Quote, QuoteError> {
        let ticker = normalize_ticker(ticker)?;

        if let Some(quote) = self.inner.cache.get(&ticker).await {
            debug!(ticker = %ticker, "Cache hit");
            return Ok(quote);
        }

        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();

        {
            let mut state = self.inner.state.lock().await;

            if state.queue.len() >= self.inner.config.queue_capacity {
                // Sacrifice the oldest low/normal request to admit new work
                let victim = state
                    .queue
                    .iter()
                    .enumerate()
                    .filter(|(_, r)| r.priority != RequestPriority::High)
                    .min_by_key(|(_, r)| r.enqueued_at)
                    .map(|(pos, _)| pos);
                match victim {
                    Some(pos) => {
                        if let Some(evicted) = state.queue.remove(pos) {
                            warn!(ticker = %evicted.ticker, "Queue full, evicting oldest request");
                            let _ = evicted.tx.send(Err(QuoteError::QueueFull));
                        }
                    }
                    None => {
                        // Every queued request is high priority; reject the
                        // newcomer instead.
                        return Err(QuoteError::QueueFull);
                    }
                }
            }

            let request = PendingRequest {
                id,
                ticker: ticker.clone(),
                priority,
                enqueued_at: Instant::now(),
                tx,
            };
            match priority {
                RequestPriority::High => state.queue.push_front(request),
                _ => state.queue.push_back(request),
            }
            debug!(ticker = %ticker, priority = %priority, queued = state.queue.len(), "Request queued");

            self.schedule_locked(&mut state);
        }

        // Independent per-request deadline: remove from the queue if still
        // pending there when it fires. Requests already in a batch are
        // covered by the caller-side timeout below.
        let this = self.clone();
        tokio::spawn(async move {
            sleep(this.inner.config.request_timeout).await;
            let mut state = this.inner.state.lock().await;
            if let Some(pos) = state.queue.iter().position(|r| r.id == id) {
                if let Some(request) = state.queue.remove(pos) {
                    debug!(ticker = %request.ticker, "Request timed out in queue");
                    let _ = request.tx.send(Err(QuoteError::Timeout));
                }
            }
        });

        match tokio::time::timeout(self.inner.config.request_timeout, rx).await {
            Ok(Ok(result)) => result,
            // Sender dropped without resolving; treat as a timeout since the
            // request can no longer complete.
            Ok(Err(_)) => Err(QuoteError::Timeout),
            Err(_) => Err(QuoteError::Timeout),
        }
    }

    /// Arm whichever dispatch trigger applies. Must be called with the
    /// state lock held.
    fn schedule_locked(&self, state: &mut DispatchState) {
        if state.in_flight || state.queue.is_empty() {
            return;
        }

        if state.queue.len() >= self.inner.config.batch_size {
            state.in_flight = true;
            state.timer_armed = false;
            state.timer_generation += 1;
            let this = self.clone();
            tokio::spawn(async move { this.dispatch_cycle().await });
            return;
        }

        if !state.timer_armed {
            state.timer_armed = true;
            state.timer_generation += 1;
            let generation = state.timer_generation;
            let this = self.clone();
            tokio::spawn(async move {
                sleep(this.inner.config.batch_delay).await;
                let mut state = this.inner.state.lock().await;
                if !state.timer_armed || state.timer_generation != generation {
                    return; // superseded by a size-triggered dispatch
                }
                state.timer_armed = false;
                if state.in_flight || state.queue.is_empty() {
                    return;
                }
                state.in_flight = true;
                drop(state);
                this.dispatch_cycle().await;
            });
        }
    }

    /// One exclusive dispatch cycle. Entered with `in_flight` already set;
    /// loops while full batches remain, then re-arms the delay timer for
    /// any partial remainder.
    async fn dispatch_cycle(&self) {
        loop {
            let batch = {
                let mut state = self.inner.state.lock().await;
                self.form_batch_locked(&mut state)
            };

            if batch.is_empty() {
                let mut state = self.inner.state.lock().await;
                state.in_flight = false;
                self.schedule_locked(&mut state);
                return;
            }

            self.resolve_batch(batch).await;

            let mut state = self.inner.state.lock().await;
            if state.queue.len() >= self.inner.config.batch_size {
                continue; // stay in flight, dispatch the next full batch
            }
            state.in_flight = false;
            self.schedule_locked(&mut state);
            return;
        }
    }

    /// Take the first N queue entries, plus any later entries for the same
    /// tickers so one upstream fetch covers every concurrent caller.
    /// Requests whose caller already gave up are dropped here.
    fn form_batch_locked(&self, state: &mut DispatchState) -> Vec<PendingRequest> {
        while let Some(pos) = state.queue.iter().position(|r| r.tx.is_closed()) {
            state.queue.remove(pos);
        }

        let take = self.inner.config.batch_size.min(state.queue.len());
        let mut batch: Vec<PendingRequest> = state.queue.drain(..take).collect();

        let tickers: HashSet<String> = batch.iter().map(|r| r.ticker.clone()).collect();
        let mut index = 0;
        while index < state.queue.len() {
            if tickers.contains(&state.queue[index].ticker) {
                if let Some(request) = state.queue.remove(index) {
                    batch.push(request);
                }
            } else {
                index += 1;
            }
        }

        batch
    }

    /// Resolve one batch: serve freshly cached tickers without refetching,
    /// fetch the rest through the provider chain once per distinct ticker,
    /// then fan results out to every requester.
    async fn resolve_batch(&self, batch: Vec<PendingRequest>) {
        let batch_start = Instant::now();
        let mut to_fetch: Vec<PendingRequest> = Vec::with_capacity(batch.len());
        let mut served_from_cache = 0usize;

        for request in batch {
            match self.inner.cache.get(&request.ticker).await {
                Some(quote) => {
                    served_from_cache += 1;
                    let _ = request.tx.send(Ok(quote));
                }
                None => to_fetch.push(request),
            }
        }

        if to_fetch.is_empty() {
            debug!(served_from_cache, "Batch fully served from cache");
            return;
        }

        let mut unique: Vec<String> = Vec::new();
        let mut seen: HashSet<&str> = HashSet::new();
        for request in &to_fetch {
            if seen.insert(request.ticker.as_str()) {
                unique.push(request.ticker.clone());
            }
        }

        let results = self.inner.chain.fetch_batch(&unique).await;

        for (ticker, quote) in &results {
            self.inner.cache.put(ticker, quote.clone()).await;
        }

        let mut resolved = 0usize;
        let mut exhausted = 0usize;
        for request in to_fetch {
            match results.get(&request.ticker) {
                Some(quote) => {
                    resolved += 1;
                    let _ = request.tx.send(Ok(quote.clone()));
                }
                None => {
                    exhausted += 1;
                    let _ = request
                        .tx
                        .send(Err(QuoteError::ProviderExhausted(request.ticker.clone())));
                }
            }
        }

        info!(
            tickers = unique.len(),
            resolved,
            exhausted,
            served_from_cache,
            duration_ms = batch_start.elapsed().as_millis() as u64,
            "Batch dispatch completed"
        );
    }
}

/// Uppercase and validate a ticker symbol at the API boundary.
pub fn normalize_ticker(raw: &str) -> Result<String, QuoteError> {
    let ticker = raw.trim().to_ascii_uppercase();

    if ticker.is_empty() || ticker.len() > MAX_TICKER_LEN {
        return Err(QuoteError::InvalidTicker(raw.to_string()));
    }
    if !ticker
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '^'))
    {
        return Err(QuoteError::InvalidTicker(raw.to_string()));
    }

    Ok(ticker)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::history::PriceHistoryStore;
    use crate::services::providers::{ProviderError, QuoteProvider, RetryPolicy};
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    /// Records every batch it serves and counts upstream fetches.
    struct RecordingProvider {
        fetches: Arc<AtomicUsize>,
        batches: Arc<std::sync::Mutex<Vec<Vec<String>>>>,
        latency: Duration,
    }

    #[async_trait]
    impl QuoteProvider for RecordingProvider {
        fn name(&self) -> &'static str {
            "recording"
        }

        async fn fetch_batch(
            &self,
            tickers: &[String],
        ) -> Result<HashMap<String, Quote>, ProviderError> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            self.batches.lock().unwrap().push(tickers.to_vec());
            if !self.latency.is_zero() {
                sleep(self.latency).await;
            }
            Ok(tickers
                .iter()
                .map(|t| (t.clone(), Quote::basic(t.clone(), 100.0, "recording")))
                .collect())
        }

        fn retry_policy(&self) -> RetryPolicy {
            RetryPolicy::none()
        }
    }

    struct TestHarness {
        dispatcher: QuoteDispatcher,
        fetches: Arc<AtomicUsize>,
        batches: Arc<std::sync::Mutex<Vec<Vec<String>>>>,
    }

    fn harness(config: PipelineConfig, latency: Duration) -> TestHarness {
        let fetches = Arc::new(AtomicUsize::new(0));
        let batches = Arc::new(std::sync::Mutex::new(Vec::new()));
        let provider = RecordingProvider {
            fetches: Arc::clone(&fetches),
            batches: Arc::clone(&batches),
            latency,
        };
        let history = Arc::new(PriceHistoryStore::new(64));
        let chain = Arc::new(ProviderChain::new(vec![Box::new(provider)], history));
        let cache = Arc::new(QuoteCache::new(config.cache_capacity));
        TestHarness {
            dispatcher: QuoteDispatcher::new(cache, chain, config),
            fetches,
            batches,
        }
    }

    fn fast_config() -> PipelineConfig {
        PipelineConfig {
            batch_size: 8,
            batch_delay: Duration::from_millis(50),
            queue_capacity: 64,
            request_timeout: Duration::from_secs(2),
            ..PipelineConfig::default()
        }
    }

    #[test]
    fn test_normalize_ticker() {
        assert_eq!(normalize_ticker(" aapl ").unwrap(), "AAPL");
        assert_eq!(normalize_ticker("^gspc").unwrap(), "^GSPC");
        assert_eq!(normalize_ticker("BRK.B").unwrap(), "BRK.B");
        assert!(matches!(normalize_ticker(""), Err(QuoteError::InvalidTicker(_))));
        assert!(matches!(normalize_ticker("AAPL$"), Err(QuoteError::InvalidTicker(_))));
        assert!(matches!(
            normalize_ticker("WAYTOOLONGSYMBOL"),
            Err(QuoteError::InvalidTicker(_))
        ));
    }

    #[tokio::test]
    async fn test_concurrent_same_ticker_coalesce() {
        let h = harness(fast_config(), Duration::ZERO);

        let tasks: Vec<_> = (0..5)
            .map(|_| {
                let dispatcher = h.dispatcher.clone();
                tokio::spawn(async move {
                    dispatcher.request_quote("AAPL", RequestPriority::Normal).await
                })
            })
            .collect();

        let results = futures::future::join_all(tasks).await;
        for result in results {
            let quote = result.unwrap().unwrap();
            assert_eq!(quote.ticker, "AAPL");
            assert_eq!(quote.price, 100.0);
        }

        assert_eq!(h.fetches.load(Ordering::SeqCst), 1, "requests must coalesce");
    }

    #[tokio::test]
    async fn test_cache_idempotence() {
        let h = harness(fast_config(), Duration::ZERO);

        let first = h
            .dispatcher
            .request_quote("MSFT", RequestPriority::Normal)
            .await
            .unwrap();
        let second = h
            .dispatcher
            .request_quote("MSFT", RequestPriority::Normal)
            .await
            .unwrap();

        assert_eq!(first.price, second.price);
        assert_eq!(h.fetches.load(Ordering::SeqCst), 1, "second call must hit the cache");
    }

    #[tokio::test]
    async fn test_two_tickers_share_one_batch() {
        let h = harness(fast_config(), Duration::ZERO);

        let d1 = h.dispatcher.clone();
        let t1 = tokio::spawn(async move { d1.request_quote("AAPL", RequestPriority::High).await });
        sleep(Duration::from_millis(10)).await;
        let d2 = h.dispatcher.clone();
        let t2 = tokio::spawn(async move { d2.request_quote("MSFT", RequestPriority::Normal).await });

        assert!(t1.await.unwrap().is_ok());
        assert!(t2.await.unwrap().is_ok());

        let batches = h.batches.lock().unwrap();
        assert_eq!(batches.len(), 1, "both requests belong to one dispatch");
        assert_eq!(batches[0].len(), 2);
    }

    #[tokio::test]
    async fn test_invalid_ticker_rejected_before_queueing() {
        let h = harness(fast_config(), Duration::ZERO);

        let result = h.dispatcher.request_quote("NOT A TICKER", RequestPriority::Normal).await;
        assert!(matches!(result, Err(QuoteError::InvalidTicker(_))));
        assert_eq!(h.fetches.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_queue_full_evicts_oldest_normal() {
        let config = PipelineConfig {
            batch_size: 8,
            batch_delay: Duration::from_millis(300),
            queue_capacity: 2,
            request_timeout: Duration::from_secs(2),
            ..PipelineConfig::default()
        };
        let h = harness(config, Duration::ZERO);

        let d1 = h.dispatcher.clone();
        let t1 = tokio::spawn(async move { d1.request_quote("TK1", RequestPriority::Normal).await });
        sleep(Duration::from_millis(10)).await;
        let d2 = h.dispatcher.clone();
        let t2 = tokio::spawn(async move { d2.request_quote("TK2", RequestPriority::Normal).await });
        sleep(Duration::from_millis(10)).await;
        let d3 = h.dispatcher.clone();
        let t3 = tokio::spawn(async move { d3.request_quote("TK3", RequestPriority::Normal).await });

        assert!(matches!(t1.await.unwrap(), Err(QuoteError::QueueFull)));
        assert!(t2.await.unwrap().is_ok());
        assert!(t3.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_request_timeout_in_queue() {
        let config = PipelineConfig {
            batch_size: 8,
            batch_delay: Duration::from_secs(30),
            queue_capacity: 8,
            request_timeout: Duration::from_millis(50),
            ..PipelineConfig::default()
        };
        let h = harness(config, Duration::ZERO);

        let start = Instant::now();
        let result = h.dispatcher.request_quote("SLOW", RequestPriority::Normal).await;
        assert!(matches!(result, Err(QuoteError::Timeout)));
        assert!(start.elapsed() < Duration::from_secs(5));
        assert_eq!(h.fetches.load(Ordering::SeqCst), 0, "timed-out request must not fetch");
    }

    #[tokio::test]
    async fn test_high_priority_jumps_queue_while_in_flight() {
        let config = PipelineConfig {
            batch_size: 2,
            batch_delay: Duration::from_millis(30),
            queue_capacity: 16,
            request_timeout: Duration::from_secs(5),
            ..PipelineConfig::default()
        };
        // Slow provider keeps the first dispatch in flight while more
        // requests pile up behind it
        let h = harness(config, Duration::from_millis(150));

        let mut tasks = Vec::new();
        for ticker in ["AA1", "AA2"] {
            let d = h.dispatcher.clone();
            tasks.push(tokio::spawn(async move {
                d.request_quote(ticker, RequestPriority::Normal).await
            }));
            sleep(Duration::from_millis(5)).await;
        }
        // First batch [AA1, AA2] is now in flight; queue three normals,
        // then one high
        for ticker in ["BB1", "BB2", "BB3"] {
            let d = h.dispatcher.clone();
            tasks.push(tokio::spawn(async move {
                d.request_quote(ticker, RequestPriority::Normal).await
            }));
            sleep(Duration::from_millis(5)).await;
        }
        let d = h.dispatcher.clone();
        tasks.push(tokio::spawn(async move {
            d.request_quote("HH1", RequestPriority::High).await
        }));

        for task in tasks {
            assert!(task.await.unwrap().is_ok());
        }

        let batches = h.batches.lock().unwrap();
        // The high request arrived last but must dispatch at or before the
        // earlier normals: it belongs to the second batch
        assert!(batches.len() >= 2);
        assert!(
            batches[1].contains(&"HH1".to_string()),
            "high priority request missing from the next batch: {:?}",
            *batches
        );
    }
}
