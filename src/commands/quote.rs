use crate::commands::{build_pipeline, parse_priority};
use futures::future::join_all;
use tracing::error;

/// One-shot fetch: request every ticker concurrently so they coalesce into
/// as few upstream batches as possible, then print the results.
pub async fn run(tickers: Vec<String>, priority: &str, offline: bool) {
    let pipeline = match build_pipeline(offline) {
        Ok(pipeline) => pipeline,
        Err(e) => {
            error!(error = %e, "Failed to build pipeline");
            std::process::exit(1);
        }
    };
    let priority = parse_priority(priority);

    let tasks: Vec<_> = tickers
        .iter()
        .map(|ticker| {
            let pipeline = pipeline.clone();
            let ticker = ticker.clone();
            tokio::spawn(async move {
                let result = pipeline.quote(&ticker, priority).await;
                (ticker, result)
            })
        })
        .collect();

    let mut failures = 0;
    for task in join_all(tasks).await {
        let Ok((ticker, result)) = task else {
            failures += 1;
            continue;
        };
        match result {
            Ok(quote) => {
                let volume = quote
                    .volume
                    .map(|v| v.to_string())
                    .unwrap_or_else(|| "-".to_string());
                println!(
                    "{:<8} {:>12.2} {:>+8.2}%  vol {:>12}  [{}]",
                    quote.ticker, quote.price, quote.change_percent, volume, quote.source
                );
            }
            Err(e) => {
                failures += 1;
                eprintln!("{:<8} error: {}", ticker, e);
            }
        }
    }

    if failures > 0 {
        std::process::exit(1);
    }
}
