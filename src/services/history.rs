use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::debug;

/// Last two observed prices for one ticker.
///
/// `previous_at < current_at` whenever both are set; `record` maintains this
/// by shifting current into previous on every write.
#[derive(Debug, Clone)]
pub struct PriceHistoryRecord {
    pub current_price: f64,
    pub current_at: DateTime<Utc>,
    pub previous_price: Option<f64>,
    pub previous_at: Option<DateTime<Utc>>,
}

/// Retains the last two observed prices per ticker so a percent change can
/// be synthesized when a provider omits the previous close.
///
/// The store exclusively owns its records; the provider chain writes through
/// `record` and everything else reads copies.
pub struct PriceHistoryStore {
    records: RwLock<HashMap<String, PriceHistoryRecord>>,
    capacity: usize,
}

impl PriceHistoryStore {
    pub fn new(capacity: usize) -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
            capacity: capacity.max(1),
        }
    }

    /// Record a newly observed price, shifting the prior current price into
    /// the previous slot. Purges least-recently-written entries when the
    /// store exceeds its capacity.
    pub async fn record(&self, ticker: &str, price: f64) {
        let now = Utc::now();
        let mut records = self.records.write().await;

        match records.get_mut(ticker) {
            Some(existing) => {
                // Shift current -> previous only when the observation is new;
                // re-recording the same price just refreshes the timestamp.
                if existing.current_price != price {
                    existing.previous_price = Some(existing.current_price);
                    existing.previous_at = Some(existing.current_at);
                }
                existing.current_price = price;
                existing.current_at = now;
            }
            None => {
                records.insert(
                    ticker.to_string(),
                    PriceHistoryRecord {
                        current_price: price,
                        current_at: now,
                        previous_price: None,
                        previous_at: None,
                    },
                );
            }
        }

        if records.len() > self.capacity {
            Self::purge_oldest(&mut records, self.capacity);
        }
    }

    /// Last known previous price for a ticker, if any.
    pub async fn previous_price(&self, ticker: &str) -> Option<f64> {
        let records = self.records.read().await;
        records.get(ticker).and_then(|r| r.previous_price)
    }

    /// True only if a previous price exists and differs from the current
    /// price (a zero-change history is useless for percent synthesis).
    pub async fn has_usable_history(&self, ticker: &str) -> bool {
        let records = self.records.read().await;
        match records.get(ticker) {
            Some(r) => r
                .previous_price
                .map(|prev| prev != r.current_price)
                .unwrap_or(false),
            None => false,
        }
    }

    /// Percent change of `current` against the stored previous price.
    pub async fn change_percent_from_history(&self, ticker: &str, current: f64) -> Option<f64> {
        let previous = self.previous_price(ticker).await?;
        if previous <= 0.0 {
            return None;
        }
        Some(((current - previous) / previous) * 100.0)
    }

    /// Number of tickers currently tracked.
    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    /// Drop least-recently-written records until `keep` remain.
    fn purge_oldest(records: &mut HashMap<String, PriceHistoryRecord>, keep: usize) {
        let excess = records.len().saturating_sub(keep);
        if excess == 0 {
            return;
        }

        let mut by_write_time: Vec<(String, DateTime<Utc>)> = records
            .iter()
            .map(|(ticker, r)| (ticker.clone(), r.current_at))
            .collect();
        by_write_time.sort_by_key(|(_, at)| *at);

        for (ticker, _) in by_write_time.into_iter().take(excess) {
            records.remove(&ticker);
        }
        debug!(purged = excess, remaining = records.len(), "History store purged oldest entries");
    }
}
