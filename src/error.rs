use thiserror::Error as ThisError;

/// Errors surfaced to pipeline callers.
///
/// Provider-level failures never appear here directly; the provider chain
/// recovers them by falling back and only reports `ProviderExhausted` once
/// every provider has been tried for a ticker.
#[derive(ThisError, Debug, Clone, PartialEq, Eq)]
pub enum QuoteError {
    #[error("Invalid ticker: {0}")]
    InvalidTicker(String),

    #[error("Request queue is full")]
    QueueFull,

    #[error("Request timed out before a batch resolved it")]
    Timeout,

    #[error("All providers failed for {0}")]
    ProviderExhausted(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, QuoteError>;

// Alias for convenience
pub type Error = QuoteError;
