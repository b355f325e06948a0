use crate::constants::{
    CACHE_EVICTION_RATIO, DEFAULT_VOLATILITY, HIGH_INTEREST_TICKERS, HIGH_VOLATILITY_THRESHOLD,
    MODERATE_VOLATILITY_THRESHOLD, TTL_AFTER_HOURS, TTL_CALM_INTRADAY, TTL_HIGH_VOLATILITY,
    TTL_MODERATE_VOLATILITY, VOLATILITY_CLAMP,
};
use crate::models::{CacheTier, Quote};
use crate::services::market_hours::is_market_open;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::debug;

/// A cached quote plus the bookkeeping that drives its expiry and eviction.
#[derive(Debug, Clone)]
struct CacheEntry {
    quote: Quote,
    cached_at: Instant,
    volatility: f64,
    tier: CacheTier,
    access_count: u64,
    last_access: Instant,
}

impl CacheEntry {
    fn score(&self) -> u64 {
        self.tier.weight() * self.access_count
    }
}

/// Quote cache with volatility- and market-hours-aware TTLs.
///
/// Fast-moving tickers expire quickly during the session; after the close
/// every entry gets the long after-hours TTL since prices barely move. Under
/// capacity pressure the lowest-scoring entries (low tier, rarely read) are
/// evicted first.
pub struct QuoteCache {
    entries: RwLock<HashMap<String, CacheEntry>>,
    capacity: usize,
}

impl QuoteCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            capacity: capacity.max(1),
        }
    }

    /// Look up a ticker. Expired entries are removed and reported as misses.
    pub async fn get(&self, ticker: &str) -> Option<Quote> {
        let market_open = is_market_open();
        let mut entries = self.entries.write().await;

        let expired = match entries.get(ticker) {
            Some(entry) => {
                entry.cached_at.elapsed() > ttl_for(entry.volatility, entry.tier, market_open)
            }
            None => return None,
        };

        if expired {
            entries.remove(ticker);
            debug!(ticker = ticker, "Cache entry expired on read");
            return None;
        }

        let entry = entries.get_mut(ticker)?;
        entry.access_count += 1;
        entry.last_access = Instant::now();
        Some(entry.quote.clone())
    }

    /// Store a fresh quote, deriving its volatility score and tier. Runs
    /// eviction first when the insert would exceed capacity.
    pub async fn put(&self, ticker: &str, quote: Quote) {
        let volatility = estimate_volatility(&quote);
        let tier = classify_tier(ticker, volatility);
        let now = Instant::now();

        let mut entries = self.entries.write().await;

        if !entries.contains_key(ticker) && entries.len() >= self.capacity {
            Self::evict_lowest(&mut entries, self.capacity);
        }

        entries.insert(
            ticker.to_string(),
            CacheEntry {
                quote,
                cached_at: now,
                volatility,
                tier,
                access_count: 0,
                last_access: now,
            },
        );
    }

    /// Remove entries whose TTL has elapsed, independent of read traffic.
    /// Called by the background sweep worker. Returns how many were removed.
    pub async fn sweep_expired(&self) -> usize {
        let market_open = is_market_open();
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, entry| {
            entry.cached_at.elapsed() <= ttl_for(entry.volatility, entry.tier, market_open)
        });
        before - entries.len()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Evict roughly the lowest-scoring 20% of entries (at least one) so a
    /// new entry can be admitted. Score = tier weight x access count, so
    /// high-tier and frequently read entries survive.
    fn evict_lowest(entries: &mut HashMap<String, CacheEntry>, capacity: usize) {
        let evict_count = ((capacity as f64 * CACHE_EVICTION_RATIO) as usize).max(1);

        let mut scored: Vec<(String, u64)> = entries
            .iter()
            .map(|(ticker, entry)| (ticker.clone(), entry.score()))
            .collect();
        scored.sort_by_key(|(_, score)| *score);

        for (ticker, _) in scored.into_iter().take(evict_count) {
            entries.remove(&ticker);
        }
        debug!(evicted = evict_count, remaining = entries.len(), "Cache evicted low-score entries");
    }
}

/// Volatility estimate on a 0–0.5 scale: the average of the absolute percent
/// change (as a fraction) and the midpoint-normalized day-range spread,
/// using whichever inputs the quote carries.
pub fn estimate_volatility(quote: &Quote) -> f64 {
    let change_component = if quote.change_percent != 0.0 {
        Some((quote.change_percent / 100.0).abs())
    } else {
        None
    };
    let spread_component = quote.day_range_spread();

    let raw = match (change_component, spread_component) {
        (Some(change), Some(spread)) => (change + spread) / 2.0,
        (Some(change), None) => change,
        (None, Some(spread)) => spread,
        (None, None) => DEFAULT_VOLATILITY,
    };

    raw.clamp(0.0, VOLATILITY_CLAMP)
}

/// Tier assignment: the fixed high-interest list always ranks High;
/// otherwise volatility above the moderate threshold earns Medium.
pub fn classify_tier(ticker: &str, volatility: f64) -> CacheTier {
    if HIGH_INTEREST_TICKERS.contains(&ticker) {
        CacheTier::High
    } else if volatility > MODERATE_VOLATILITY_THRESHOLD {
        CacheTier::Medium
    } else {
        CacheTier::Low
    }
}

/// TTL selection, checked in order: after-hours beats everything, then the
/// volatility bands. High-tier tickers never get the longest intraday TTL;
/// watchlist staples are worth refetching sooner.
pub fn ttl_for(volatility: f64, tier: CacheTier, market_open: bool) -> Duration {
    if !market_open {
        return TTL_AFTER_HOURS;
    }
    if volatility > HIGH_VOLATILITY_THRESHOLD {
        return TTL_HIGH_VOLATILITY;
    }
    if volatility > MODERATE_VOLATILITY_THRESHOLD {
        return TTL_MODERATE_VOLATILITY;
    }
    if tier == CacheTier::High {
        return TTL_MODERATE_VOLATILITY;
    }
    TTL_CALM_INTRADAY
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quote_with_change(ticker: &str, change_percent: f64) -> Quote {
        let mut quote = Quote::basic(ticker, 100.0, "test");
        quote.change_percent = change_percent;
        quote
    }

    #[test]
    fn test_volatility_from_change_only() {
        let quote = quote_with_change("XYZ", -8.0);
        let vol = estimate_volatility(&quote);
        assert!((vol - 0.08).abs() < 1e-9);
    }

    #[test]
    fn test_volatility_averages_change_and_spread() {
        let mut quote = quote_with_change("XYZ", 4.0);
        quote.day_high = Some(102.0);
        quote.day_low = Some(98.0);
        // change 0.04, spread 0.04 -> average 0.04
        let vol = estimate_volatility(&quote);
        assert!((vol - 0.04).abs() < 1e-9);
    }

    #[test]
    fn test_volatility_default_and_clamp() {
        let quote = quote_with_change("XYZ", 0.0);
        assert!((estimate_volatility(&quote) - DEFAULT_VOLATILITY).abs() < 1e-9);

        let extreme = quote_with_change("XYZ", 500.0);
        assert!((estimate_volatility(&extreme) - VOLATILITY_CLAMP).abs() < 1e-9);
    }

    #[test]
    fn test_tier_classification() {
        assert_eq!(classify_tier("AAPL", 0.0), CacheTier::High);
        assert_eq!(classify_tier("XYZ", 0.08), CacheTier::Medium);
        assert_eq!(classify_tier("XYZ", 0.01), CacheTier::Low);
    }

    #[test]
    fn test_ttl_high_volatility_shorter() {
        let high = ttl_for(0.2, CacheTier::Low, true);
        let low = ttl_for(0.01, CacheTier::Low, true);
        assert!(high < low);
    }

    #[test]
    fn test_ttl_after_hours_at_least_market_hours() {
        for vol in [0.01, 0.06, 0.2] {
            for tier in [CacheTier::High, CacheTier::Medium, CacheTier::Low] {
                let after = ttl_for(vol, tier, false);
                let during = ttl_for(vol, tier, true);
                assert!(after >= during, "vol={} tier={}", vol, tier);
            }
        }
    }

    #[test]
    fn test_ttl_high_tier_clamped_intraday() {
        let staple = ttl_for(0.01, CacheTier::High, true);
        let calm = ttl_for(0.01, CacheTier::Low, true);
        assert!(staple < calm);
    }

    #[tokio::test]
    async fn test_put_get_roundtrip() {
        let cache = QuoteCache::new(8);
        cache.put("AAPL", quote_with_change("AAPL", 1.0)).await;

        let hit = cache.get("AAPL").await.unwrap();
        assert_eq!(hit.ticker, "AAPL");
        assert_eq!(cache.get("MSFT").await.map(|q| q.ticker), None);
    }

    #[tokio::test]
    async fn test_expired_entry_is_miss_and_removed() {
        let cache = QuoteCache::new(8);
        cache.put("XYZ", quote_with_change("XYZ", 1.0)).await;

        // Backdate the entry far past any TTL
        {
            let mut entries = cache.entries.write().await;
            let entry = entries.get_mut("XYZ").unwrap();
            entry.cached_at = Instant::now() - Duration::from_secs(3_600);
        }

        assert!(cache.get("XYZ").await.is_none());
        assert_eq!(cache.len().await, 0);
    }

    #[tokio::test]
    async fn test_sweep_removes_expired_without_reads() {
        let cache = QuoteCache::new(8);
        cache.put("AAA", quote_with_change("AAA", 1.0)).await;
        cache.put("BBB", quote_with_change("BBB", 1.0)).await;

        {
            let mut entries = cache.entries.write().await;
            entries.get_mut("AAA").unwrap().cached_at =
                Instant::now() - Duration::from_secs(3_600);
        }

        let removed = cache.sweep_expired().await;
        assert_eq!(removed, 1);
        assert_eq!(cache.len().await, 1);
    }

    #[tokio::test]
    async fn test_eviction_prefers_low_score_entries() {
        let cache = QuoteCache::new(5);

        // AAPL is on the high-interest list; read it a few times as well
        cache.put("AAPL", quote_with_change("AAPL", 1.0)).await;
        for _ in 0..3 {
            cache.get("AAPL").await;
        }

        for ticker in ["XX1", "XX2", "XX3", "XX4"] {
            cache.put(ticker, quote_with_change(ticker, 0.5)).await;
        }
        assert_eq!(cache.len().await, 5);

        // One more distinct ticker forces an eviction pass
        cache.put("XX5", quote_with_change("XX5", 0.5)).await;

        let entries = cache.entries.read().await;
        assert!(
            entries.contains_key("AAPL"),
            "high-tier entry must survive while low-tier entries remain"
        );
        assert!(entries.len() <= 5);
    }
}
