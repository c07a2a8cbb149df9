//! stream CLI command: live Binance tickers written into the snapshot cache.

use anyhow::Result;
use clap::Args;
use cryptopulse_core::MarketSnapshot;
use cryptopulse_market_data::TickerStream;
use tokio::sync::mpsc;
use tracing::{info, warn};

use super::context::AppContext;

#[derive(Args, Debug, Clone)]
pub struct StreamArgs {
    /// Comma-separated symbols (defaults to the configured watchlist)
    #[arg(long, value_delimiter = ',')]
    pub symbols: Vec<String>,

    /// Print every ticker update
    #[arg(long)]
    pub verbose: bool,
}

/// Streams until Ctrl+C or until reconnect attempts are exhausted.
///
/// # Errors
/// Returns an error when the stream gives up.
pub async fn run_stream(ctx: &AppContext, args: StreamArgs) -> Result<()> {
    let symbols = ctx.symbols_or_watchlist(&args.symbols);
    info!("Streaming tickers for {}", symbols.join(", "));

    let (tx, mut rx) = mpsc::channel::<MarketSnapshot>(256);
    let mut stream = TickerStream::new(
        ctx.config.market_data.stream.clone(),
        symbols,
        ctx.repos.cache.clone(),
    )
    .with_updates(tx);

    let verbose = args.verbose;
    let printer = tokio::spawn(async move {
        while let Some(snapshot) = rx.recv().await {
            if verbose {
                println!("{}", format_update(&snapshot));
            }
        }
    });

    let result = tokio::select! {
        result = stream.run() => result,
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, stopping stream");
            Ok(())
        }
    };

    let stats = stream.stats();
    info!(
        "Stream finished: {} messages, {} snapshots cached, {} parse errors, {} reconnects",
        stats.messages_received, stats.snapshots_written, stats.parse_errors, stats.reconnects
    );
    drop(stream);
    if let Err(e) = printer.await {
        warn!("Update printer failed: {}", e);
    }

    result.map_err(Into::into)
}

fn format_update(s: &MarketSnapshot) -> String {
    format!(
        "{} {:<10} {:>14.4} {:>+7.2}%  vol {:.0}",
        s.fetched_at.format("%H:%M:%S"),
        s.symbol,
        s.price,
        s.change_24h_pct,
        s.volume_24h
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use cryptopulse_core::Ticker;

    #[test]
    fn test_format_update() {
        let ticker = Ticker {
            price: 43_250.5,
            change_24h_pct: -1.25,
            volume_24h: 1_000_000.0,
            high_24h: 44_000.0,
            low_24h: 42_000.0,
        };
        let at = Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 5).unwrap();
        let snapshot = MarketSnapshot::from_ticker("BTCUSDT", ticker, "binance-ws", at);
        let line = format_update(&snapshot);
        assert!(line.starts_with("12:30:05 BTCUSDT"));
        assert!(line.contains("43250.5000"));
        assert!(line.contains("-1.25%"));
    }
}
