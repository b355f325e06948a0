use crate::services::market_hours::is_market_open;
use crate::services::{PriceHistoryStore, QuoteCache};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info};

/// Periodically removes expired cache entries so memory stays bounded even
/// when nobody is reading. Runs until its task is dropped or aborted.
pub async fn run(cache: Arc<QuoteCache>, history: Arc<PriceHistoryStore>, interval: Duration) {
    info!(interval_secs = interval.as_secs(), "Starting cache sweep worker");

    let mut iteration_count = 0u64;

    loop {
        sleep(interval).await;
        iteration_count += 1;

        let removed = cache.sweep_expired().await;
        let cache_len = cache.len().await;
        let history_len = history.len().await;

        if removed > 0 {
            info!(
                iteration = iteration_count,
                removed,
                cache_entries = cache_len,
                history_entries = history_len,
                is_market_open = is_market_open(),
                "Sweep worker: removed expired entries"
            );
        } else {
            debug!(
                iteration = iteration_count,
                cache_entries = cache_len,
                "Sweep worker: nothing to remove"
            );
        }
    }
}
