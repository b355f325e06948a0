use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Point-in-time price snapshot for one ticker.
///
/// A quote is immutable after creation: the cache and callers only ever see
/// clones, and a newer quote replaces the old one wholesale. Extended fields
/// are optional because not every provider supplies them; the synthetic
/// fallback provider fills only the basics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Quote {
    /// Ticker symbol, normalized to uppercase (e.g., "AAPL")
    pub ticker: String,

    /// Last traded price. Always positive.
    pub price: f64,

    /// Percent change versus previous close (signed, e.g., -1.25)
    pub change_percent: f64,

    /// Trading volume (shares)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub volume: Option<u64>,

    /// Market capitalization in the quote currency
    #[serde(skip_serializing_if = "Option::is_none")]
    pub market_cap: Option<f64>,

    /// Trailing price/earnings ratio
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pe_ratio: Option<f64>,

    /// Intraday high
    #[serde(skip_serializing_if = "Option::is_none")]
    pub day_high: Option<f64>,

    /// Intraday low
    #[serde(skip_serializing_if = "Option::is_none")]
    pub day_low: Option<f64>,

    /// 52-week high
    #[serde(skip_serializing_if = "Option::is_none")]
    pub year_high: Option<f64>,

    /// 52-week low
    #[serde(skip_serializing_if = "Option::is_none")]
    pub year_low: Option<f64>,

    /// When this snapshot was produced
    pub fetched_at: DateTime<Utc>,

    /// Name of the provider that served this quote
    pub source: String,
}

impl Quote {
    /// Minimal quote with just a price, as produced by providers that carry
    /// no extended data. `change_percent` starts at 0 and is filled in by
    /// the provider chain from price history where possible.
    pub fn basic(ticker: impl Into<String>, price: f64, source: impl Into<String>) -> Self {
        Self {
            ticker: ticker.into(),
            price,
            change_percent: 0.0,
            volume: None,
            market_cap: None,
            pe_ratio: None,
            day_high: None,
            day_low: None,
            year_high: None,
            year_low: None,
            fetched_at: Utc::now(),
            source: source.into(),
        }
    }

    /// Midpoint-normalized day range spread, when both ends are present.
    /// Used by the cache as one input to the volatility estimate.
    pub fn day_range_spread(&self) -> Option<f64> {
        match (self.day_high, self.day_low) {
            (Some(high), Some(low)) if high >= low => {
                let mid = (high + low) / 2.0;
                if mid > 0.0 {
                    Some((high - low) / mid)
                } else {
                    None
                }
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_day_range_spread() {
        let mut quote = Quote::basic("AAPL", 100.0, "test");
        assert_eq!(quote.day_range_spread(), None);

        quote.day_high = Some(102.0);
        quote.day_low = Some(98.0);
        let spread = quote.day_range_spread().unwrap();
        assert!((spread - 0.04).abs() < 1e-9);
    }

    #[test]
    fn test_day_range_spread_inverted_range() {
        let mut quote = Quote::basic("AAPL", 100.0, "test");
        quote.day_high = Some(98.0);
        quote.day_low = Some(102.0);
        assert_eq!(quote.day_range_spread(), None);
    }
}
