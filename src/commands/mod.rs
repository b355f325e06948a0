pub mod quote;
pub mod watch;

use crate::config::PipelineConfig;
use crate::models::RequestPriority;
use crate::services::SyntheticProvider;
use crate::QuotePipeline;

/// Build a pipeline for a CLI command, honoring env overrides and the
/// offline flag.
pub(crate) fn build_pipeline(offline: bool) -> Result<QuotePipeline, crate::error::QuoteError> {
    let config = PipelineConfig::from_env();
    if offline {
        Ok(QuotePipeline::with_providers(
            config,
            vec![Box::new(SyntheticProvider::new())],
        ))
    } else {
        QuotePipeline::new(config)
    }
}

pub(crate) fn parse_priority(raw: &str) -> RequestPriority {
    match RequestPriority::parse(raw) {
        Some(priority) => priority,
        None => {
            eprintln!("Unknown priority '{}', using normal", raw);
            RequestPriority::Normal
        }
    }
}
