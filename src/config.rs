use crate::constants::{
    DEFAULT_BATCH_DELAY, DEFAULT_BATCH_SIZE, DEFAULT_CACHE_CAPACITY, DEFAULT_HISTORY_CAPACITY,
    DEFAULT_PROVIDER_HTTP_TIMEOUT, DEFAULT_QUEUE_CAPACITY, DEFAULT_REQUEST_TIMEOUT,
    DEFAULT_SWEEP_INTERVAL,
};
use std::time::Duration;

/// Tunables for one pipeline instance.
///
/// Constructed once at startup and passed by reference to the components
/// that need it; there is no global configuration state.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Pending-request queue capacity.
    pub queue_capacity: usize,
    /// Queue length that triggers an immediate dispatch.
    pub batch_size: usize,
    /// Delay before a partial batch dispatches anyway.
    pub batch_delay: Duration,
    /// Per-request deadline independent of batch timing.
    pub request_timeout: Duration,
    /// HTTP timeout for a single provider call.
    pub provider_http_timeout: Duration,
    /// Cache entry cap before score-based eviction.
    pub cache_capacity: usize,
    /// History store entry cap.
    pub history_capacity: usize,
    /// Background sweep period for expired cache entries.
    pub sweep_interval: Duration,
    /// Base URL of the primary quote endpoint.
    pub quote_api_base_url: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            batch_size: DEFAULT_BATCH_SIZE,
            batch_delay: DEFAULT_BATCH_DELAY,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            provider_http_timeout: DEFAULT_PROVIDER_HTTP_TIMEOUT,
            cache_capacity: DEFAULT_CACHE_CAPACITY,
            history_capacity: DEFAULT_HISTORY_CAPACITY,
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
            quote_api_base_url: "https://query1.finance.yahoo.com".to_string(),
        }
    }
}

impl PipelineConfig {
    /// Build a config from defaults, letting `QUOTEFEED_*` env vars override
    /// individual knobs.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        config.queue_capacity = env_usize("QUOTEFEED_QUEUE_CAPACITY", config.queue_capacity);
        config.batch_size = env_usize("QUOTEFEED_BATCH_SIZE", config.batch_size);
        config.batch_delay = env_millis("QUOTEFEED_BATCH_DELAY_MS", config.batch_delay);
        config.request_timeout = env_millis("QUOTEFEED_REQUEST_TIMEOUT_MS", config.request_timeout);
        config.provider_http_timeout =
            env_millis("QUOTEFEED_PROVIDER_TIMEOUT_MS", config.provider_http_timeout);
        config.cache_capacity = env_usize("QUOTEFEED_CACHE_CAPACITY", config.cache_capacity);
        config.history_capacity = env_usize("QUOTEFEED_HISTORY_CAPACITY", config.history_capacity);
        config.sweep_interval = env_millis("QUOTEFEED_SWEEP_INTERVAL_MS", config.sweep_interval);

        if let Ok(url) = std::env::var("QUOTEFEED_QUOTE_API_URL") {
            let url = url.trim().trim_end_matches('/').to_string();
            if !url.is_empty() {
                config.quote_api_base_url = url;
            }
        }

        config
    }
}

fn env_usize(key: &str, default: usize) -> usize {
    std::env::var(key)
        .ok()
        .and_then(|s| s.parse::<usize>().ok())
        .unwrap_or(default)
}

fn env_millis(key: &str, default: Duration) -> Duration {
    std::env::var(key)
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .map(Duration::from_millis)
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = PipelineConfig::default();
        assert_eq!(config.batch_size, 8);
        assert_eq!(config.queue_capacity, 64);
        assert!(config.provider_http_timeout < config.request_timeout);
    }
}
