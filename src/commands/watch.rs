use crate::commands::{build_pipeline, parse_priority};
use chrono::Utc;
use futures::future::join_all;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{error, info};

/// Keep a set of tickers refreshed on a fixed interval. The cache decides
/// whether each refresh actually hits the network; calm tickers mostly
/// resolve as cache hits.
pub async fn run(tickers: Vec<String>, interval_secs: u64, offline: bool) {
    let pipeline = match build_pipeline(offline) {
        Ok(pipeline) => pipeline,
        Err(e) => {
            error!(error = %e, "Failed to build pipeline");
            std::process::exit(1);
        }
    };
    let priority = parse_priority("normal");
    let interval = Duration::from_secs(interval_secs.max(1));

    // Keeps the cache bounded for as long as the watch loop runs
    let _sweep = pipeline.spawn_sweep_worker();
    info!(tickers = tickers.len(), interval_secs, "Starting watch loop");

    loop {
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

        println!("--- {} ---", Utc::now().format("%H:%M:%S"));
        for task in join_all(tasks).await {
            let Ok((ticker, result)) = task else { continue };
            match result {
                Ok(quote) => {
                    println!(
                        "{:<8} {:>12.2} {:>+8.2}%",
                        quote.ticker, quote.price, quote.change_percent
                    );
                }
                Err(e) => eprintln!("{:<8} error: {}", ticker, e),
            }
        }

        sleep(interval).await;
    }
}
