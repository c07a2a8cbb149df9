//! backtest CLI command: replays live or CSV history through the synthesizer.

use anyhow::Result;
use chrono::Utc;
use clap::Args;
use cryptopulse_backtest::{BacktestReport, HistoricalDataProvider};
use std::path::PathBuf;

use super::context::AppContext;

/// Arguments for the backtest command.
#[derive(Args, Debug, Clone)]
pub struct BacktestArgs {
    /// Symbol to backtest (e.g., "BTCUSDT")
    #[arg(long)]
    pub symbol: String,

    /// Days of history (defaults to backtest.default_days, at most 90)
    #[arg(long)]
    pub days: Option<i64>,

    /// Read candles from a CSV file (timestamp,open,high,low,close,volume)
    /// instead of the market-data providers
    #[arg(long)]
    pub csv: Option<PathBuf>,

    /// List individual trades
    #[arg(long)]
    pub trades: bool,
}

/// Runs, stores and prints one backtest.
///
/// # Errors
/// Returns an error if history cannot be loaded, is too short, or the run
/// cannot be stored.
pub async fn run_backtest(ctx: &AppContext, args: BacktestArgs) -> Result<()> {
    let symbol = args.symbol.trim().to_uppercase();
    let days = args.days.unwrap_or_else(|| ctx.backtests.default_days());
    let now = Utc::now();

    let report = match &args.csv {
        Some(path) => {
            tracing::info!("Loading {} candles from {}", symbol, path.display());
            let series = HistoricalDataProvider::from_csv(path, &symbol, ctx.services.interval)?;
            ctx.backtests.run_series(&series, days, now).await?
        }
        None => ctx.backtests.run(&symbol, days, now).await?,
    };

    print!("{}", format_report(&report, args.trades));
    Ok(())
}

fn format_report(report: &BacktestReport, with_trades: bool) -> String {
    let run = &report.run;
    let mut out = format!(
        "Backtest #{} {} over {} days ({} to {})\n",
        report.run_id,
        run.symbol,
        run.tested_days,
        run.start_date.format("%Y-%m-%d %H:%M"),
        run.end_date.format("%Y-%m-%d %H:%M")
    );
    out.push_str(&format!(
        "  signals:      {} ({}W {}L {}N)\n",
        run.signals_tested, run.signals_win, run.signals_loss, run.signals_neutral
    ));
    out.push_str(&format!("  win rate:     {:.1}%\n", run.winrate));
    out.push_str(&format!(
        "  avg win/loss: {:+.2}% / {:+.2}%\n",
        run.avg_profit, run.avg_loss
    ));
    out.push_str(&format!("  total pnl:    {:+.2}%\n", run.total_pnl_percent));
    out.push_str(&format!("  max drawdown: {:.2}%\n", run.max_drawdown_pct));
    out.push_str(&format!(
        "  best/worst:   {} / {}\n",
        run.best_pattern.as_deref().unwrap_or("-"),
        run.worst_pattern.as_deref().unwrap_or("-")
    ));
    if let Some(risk) = &report.risk {
        out.push_str(&format!(
            "  risk:         {} at {:.2} allocation\n",
            risk.risk_status, risk.adjusted_allocation
        ));
    }

    if with_trades {
        for t in &report.trades {
            out.push_str(&format!(
                "  {} {:<4} {:>8} entry {:.4} exit {:.4} {:+.2}% in {} bars  {}\n",
                t.timestamp.format("%Y-%m-%d %H:%M"),
                t.signal_type,
                t.result,
                t.entry_price,
                t.exit_price,
                t.pnl_percent,
                t.bars_held,
                t.pattern_name
            ));
        }
    }
    out
}
