//! Pipeline Tuning Constants
//!
//! Hand-tuned defaults for the quote pipeline. None of these values are
//! contractual; every one can be overridden through [`crate::config`] env
//! vars without touching code.

use std::time::Duration;

/// Maximum number of pending requests the dispatcher queue will hold.
/// When full, the oldest low/normal request is evicted to admit new work.
pub const DEFAULT_QUEUE_CAPACITY: usize = 64;

/// Number of requests that triggers an immediate batch dispatch.
pub const DEFAULT_BATCH_SIZE: usize = 8;

/// How long a partially filled batch waits before dispatching anyway.
pub const DEFAULT_BATCH_DELAY: Duration = Duration::from_millis(150);

/// Per-request deadline, independent of batch timing. A request still queued
/// when this fires is removed and failed with `Timeout`.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// HTTP timeout for a single upstream provider call. Kept below the request
/// timeout so a hung provider fails over before callers give up.
pub const DEFAULT_PROVIDER_HTTP_TIMEOUT: Duration = Duration::from_secs(3);

/// Maximum number of cached quotes before score-based eviction runs.
pub const DEFAULT_CACHE_CAPACITY: usize = 256;

/// Fraction of entries removed when the cache hits capacity.
pub const CACHE_EVICTION_RATIO: f64 = 0.2;

/// How often the background sweep removes expired cache entries.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Maximum tickers tracked by the price history store. Least-recently-written
/// entries are purged beyond this.
pub const DEFAULT_HISTORY_CAPACITY: usize = 512;

/// Cache TTLs by regime, checked in order: after-hours, high volatility,
/// moderate volatility, calm.
///
/// | Regime              | TTL     |
/// |---------------------|---------|
/// | After hours/weekend | 15 min  |
/// | High volatility     | 20 s    |
/// | Moderate volatility | 60 s    |
/// | Calm intraday       | 180 s   |
pub const TTL_AFTER_HOURS: Duration = Duration::from_secs(900);
pub const TTL_HIGH_VOLATILITY: Duration = Duration::from_secs(20);
pub const TTL_MODERATE_VOLATILITY: Duration = Duration::from_secs(60);
pub const TTL_CALM_INTRADAY: Duration = Duration::from_secs(180);

/// Volatility score (0–0.5 scale) above which a quote is considered
/// fast-moving and gets the short TTL.
pub const HIGH_VOLATILITY_THRESHOLD: f64 = 0.10;

/// Volatility score above which a quote gets the medium TTL and the cache
/// tier is promoted from Low to Medium.
pub const MODERATE_VOLATILITY_THRESHOLD: f64 = 0.04;

/// Volatility assumed when a quote carries neither a change percent nor a
/// day range to derive one from.
pub const DEFAULT_VOLATILITY: f64 = 0.05;

/// Upper clamp for the derived volatility score.
pub const VOLATILITY_CLAMP: f64 = 0.5;

/// Tickers that always cache at the High tier regardless of volatility.
/// Major indices plus the mega-caps that dominate real watchlists.
pub const HIGH_INTEREST_TICKERS: &[&str] = &[
    "SPY", "QQQ", "DIA", "^GSPC", "^DJI", "^IXIC",
    "AAPL", "MSFT", "GOOGL", "AMZN", "NVDA", "META", "TSLA",
];

/// Maximum ticker symbol length accepted at the API boundary.
pub const MAX_TICKER_LEN: usize = 12;
