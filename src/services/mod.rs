pub mod cache;
pub mod dispatcher;
pub mod history;
pub mod market_hours;
pub mod providers;

pub use cache::QuoteCache;
pub use dispatcher::{normalize_ticker, QuoteDispatcher};
pub use history::PriceHistoryStore;
pub use market_hours::{is_market_open, MarketHours};
pub use providers::{ProviderChain, ProviderError, QuoteProvider, RetryPolicy, SyntheticProvider, YahooProvider};
