use serde::{Deserialize, Serialize};
use std::fmt;

/// Caller-supplied urgency for a quote request. Governs queue placement and
/// which requests are sacrificed when the queue is saturated; once a batch
/// is formed, execution order is unaffected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RequestPriority {
    /// Insert at the front of the pending queue
    High,
    /// Append to the queue
    Normal,
    /// Append to the queue; first candidate for eviction
    Low,
}

impl RequestPriority {
    /// Parse a priority from its wire/CLI form.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "high" => Some(RequestPriority::High),
            "normal" => Some(RequestPriority::Normal),
            "low" => Some(RequestPriority::Low),
            _ => None,
        }
    }
}

impl Default for RequestPriority {
    fn default() -> Self {
        RequestPriority::Normal
    }
}

impl fmt::Display for RequestPriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RequestPriority::High => "high",
            RequestPriority::Normal => "normal",
            RequestPriority::Low => "low",
        };
        write!(f, "{}", s)
    }
}

/// Cache-side classification of a ticker. High-interest tickers resist
/// eviction; the tier also weights the eviction score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CacheTier {
    High,
    Medium,
    Low,
}

impl CacheTier {
    /// Eviction-score weight. Higher weight protects an entry under
    /// capacity pressure.
    pub fn weight(&self) -> u64 {
        match self {
            CacheTier::High => 4,
            CacheTier::Medium => 2,
            CacheTier::Low => 1,
        }
    }
}

impl fmt::Display for CacheTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CacheTier::High => "high",
            CacheTier::Medium => "medium",
            CacheTier::Low => "low",
        };
        write!(f, "{}", s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_priority_parse() {
        assert_eq!(RequestPriority::parse("HIGH"), Some(RequestPriority::High));
        assert_eq!(RequestPriority::parse("normal"), Some(RequestPriority::Normal));
        assert_eq!(RequestPriority::parse("bogus"), None);
    }

    #[test]
    fn test_tier_weights_ordered() {
        assert!(CacheTier::High.weight() > CacheTier::Medium.weight());
        assert!(CacheTier::Medium.weight() > CacheTier::Low.weight());
    }
}
