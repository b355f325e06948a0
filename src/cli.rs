use clap::{Parser, Subcommand};

use crate::commands;

#[derive(Parser)]
#[command(name = "quotefeed")]
#[command(about = "Batched market data pipeline CLI", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Fetch quotes for one or more tickers and print them
    Quote {
        /// Ticker symbols (e.g. AAPL MSFT ^GSPC)
        #[arg(required = true)]
        tickers: Vec<String>,

        /// Request priority: high, normal, or low
        #[arg(short, long, default_value = "normal")]
        priority: String,

        /// Serve quotes from the synthetic provider only (no network)
        #[arg(long)]
        offline: bool,
    },
    /// Refresh a set of tickers on a fixed interval until interrupted
    Watch {
        /// Ticker symbols to keep refreshed
        #[arg(required = true)]
        tickers: Vec<String>,

        /// Seconds between refreshes
        #[arg(short, long, default_value_t = 15)]
        interval: u64,

        /// Serve quotes from the synthetic provider only (no network)
        #[arg(long)]
        offline: bool,
    },
}

pub async fn run() {
    let cli = Cli::parse();

    match cli.command {
        Commands::Quote {
            tickers,
            priority,
            offline,
        } => {
            commands::quote::run(tickers, &priority, offline).await;
        }
        Commands::Watch {
            tickers,
            interval,
            offline,
        } => {
            commands::watch::run(tickers, interval, offline).await;
        }
    }
}
