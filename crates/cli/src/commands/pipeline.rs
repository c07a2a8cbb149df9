//! One-shot pipeline stages.

use anyhow::Result;
use chrono::Utc;
use clap::Args;
use cryptopulse_core::{CandidateSignal, RiskState};
use cryptopulse_pipeline::{CycleOutcome, PerformanceBucket, PerformanceReport, SymbolReport};
use cryptopulse_scheduler::StageReport;

use super::context::AppContext;

#[derive(Args, Debug, Clone)]
pub struct SynthesizeArgs {
    /// Symbol to synthesize (defaults to the configured watchlist)
    #[arg(long)]
    pub symbol: Option<String>,
}

/// Runs one synthesis cycle and prints what happened per symbol.
///
/// # Errors
/// Returns an error if the cycle times out.
pub async fn run_synthesize(ctx: &AppContext, args: SynthesizeArgs) -> Result<()> {
    let requested: Vec<String> = args.symbol.into_iter().collect();
    let symbols = ctx.symbols_or_watchlist(&requested);

    let reports = ctx.services.cycle.run(&symbols, Utc::now()).await?;
    for report in &reports {
        println!("{}", format_symbol_report(report));
    }
    println!("{}", StageReport::Synthesis(reports).summary());
    Ok(())
}

fn format_candidate(label: &str, c: &CandidateSignal) -> String {
    format!(
        "{:<10} {:<10} {:<4} conf {:>5.1}  entry {:.4}  tp {:.4}  sl {:.4}  {}",
        c.symbol,
        label,
        c.signal_type,
        c.confidence,
        c.entry_price,
        c.take_profit,
        c.stop_loss,
        c.pattern_name
    )
}

fn format_symbol_report(report: &SymbolReport) -> String {
    match &report.result {
        Ok(CycleOutcome::Persisted(signal)) => format!(
            "{:<10} {:<10} {:<4} conf {:>5.1}  entry {:.4}  tp {:.4}  sl {:.4}  {}  id {}",
            signal.symbol,
            "persisted",
            signal.signal_type,
            signal.confidence,
            signal.entry_price,
            signal.take_profit,
            signal.stop_loss,
            signal.pattern_name,
            signal.id
        ),
        Ok(CycleOutcome::Wait(c)) => format_candidate("wait", c),
        Ok(CycleOutcome::Suppressed(c)) => format_candidate("suppressed", c),
        Err(e) => format!("{:<10} {:<10} {}", report.symbol, "failed", e),
    }
}

/// Evaluates matured signals once.
///
/// # Errors
/// Returns an error if the due signals cannot be read.
pub async fn run_evaluate(ctx: &AppContext) -> Result<()> {
    let summary = ctx.services.evaluation.run(Utc::now()).await?;
    println!("{}", StageReport::Evaluation(summary).summary());
    Ok(())
}

#[derive(Args, Debug, Clone)]
pub struct RiskArgs {
    /// Symbol to assess
    #[arg(long)]
    pub symbol: String,
}

/// Recomputes and prints the risk state of a symbol.
///
/// # Errors
/// Returns an error if the risk inputs cannot be read or the state cannot be stored.
pub async fn run_risk(ctx: &AppContext, args: RiskArgs) -> Result<()> {
    let symbol = args.symbol.trim().to_uppercase();
    let state = ctx.services.risk.recompute(&symbol, Utc::now()).await?;
    print!("{}", format_risk(&state));
    Ok(())
}

fn format_risk(state: &RiskState) -> String {
    let mut out = format!(
        "{}\n  status:      {}\n  win rate:    {:.1}% ({}, {} confidence)\n  allocation:  {:.2} -> {:.2}\n  leverage:    {:.1}x\n  reason:      {}\n",
        state.symbol,
        state.risk_status,
        state.recent_winrate,
        state.winrate_source.as_str(),
        state.confidence_level,
        state.base_allocation,
        state.adjusted_allocation,
        state.leverage,
        state.last_adjustment_reason
    );
    for rec in &state.recommendations {
        out.push_str(&format!("  - {rec}\n"));
    }
    out
}

#[derive(Args, Debug, Clone)]
pub struct ReportArgs {
    /// Window in days (defaults to learning.report_days)
    #[arg(long)]
    pub days: Option<i64>,

    /// Print the report as JSON
    #[arg(long)]
    pub json: bool,
}

/// Prints the performance report with the best learned patterns.
///
/// # Errors
/// Returns an error if outcomes or patterns cannot be read.
pub async fn run_report(ctx: &AppContext, args: ReportArgs) -> Result<()> {
    let days = args.days.unwrap_or(ctx.config.learning.report_days).clamp(1, 365);
    let report = ctx
        .services
        .learning
        .performance_report(days, Utc::now())
        .await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    print!("{}", format_report(&report));

    let patterns = ctx.services.learning.top_patterns(5).await?;
    if !patterns.is_empty() {
        println!("Top patterns:");
        for p in patterns {
            println!(
                "  {:<48} {:>4} seen  {:>5.1}% won  boost {:+.1}",
                p.pattern_name, p.occurrence_count, p.win_rate, p.confidence_boost
            );
        }
    }
    Ok(())
}

fn format_report(report: &PerformanceReport) -> String {
    let line = |name: &str, b: &PerformanceBucket| {
        format!(
            "  {:<10} {:>4} outcomes  {:>3}W {:>3}L {:>3}N  {:>5.1}% win rate  {:+.2}% pnl\n",
            name, b.total, b.wins, b.losses, b.neutrals, b.win_rate, b.total_pnl_percent
        )
    };

    let mut out = format!(
        "Performance over the last {} days (since {})\n",
        report.window_days,
        report.since.format("%Y-%m-%d %H:%M")
    );
    out.push_str(&line("overall", &report.overall));
    for (symbol, bucket) in &report.by_symbol {
        out.push_str(&line(symbol, bucket));
    }
    for (signal_type, bucket) in &report.by_signal_type {
        out.push_str(&line(signal_type, bucket));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use cryptopulse_core::{
        IndicatorSet, Outcome, OutcomeResult, PipelineError, RiskStatus, SignalSource, SignalType,
        WinrateSource,
    };
    use uuid::Uuid;

    fn candidate() -> CandidateSignal {
        CandidateSignal {
            symbol: "BTCUSDT".to_string(),
            signal_type: SignalType::Buy,
            confidence: 72.0,
            entry_price: 100.0,
            take_profit: 102.0,
            stop_loss: 99.0,
            pattern_name: "RSI_OVERSOLD_MACD_BULL_EMA_UP_NEWS_NEUTRAL".to_string(),
            reason: "test".to_string(),
            source: SignalSource::Rule,
            indicators: IndicatorSet::default(),
        }
    }

    #[test]
    fn test_format_symbol_report() {
        let suppressed = SymbolReport {
            symbol: "BTCUSDT".to_string(),
            result: Ok(CycleOutcome::Suppressed(candidate())),
        };
        let line = format_symbol_report(&suppressed);
        assert!(line.starts_with("BTCUSDT"));
        assert!(line.contains("suppressed"));
        assert!(line.contains("conf  72.0"));

        let failed = SymbolReport {
            symbol: "ETHUSDT".to_string(),
            result: Err(PipelineError::NoMarketDataAvailable {
                symbol: "ETHUSDT".to_string(),
            }),
        };
        assert!(format_symbol_report(&failed).contains("failed"));
    }

    #[test]
    fn test_format_risk() {
        let state = RiskState {
            symbol: "ETHUSDT".to_string(),
            recent_winrate: 58.0,
            winrate_source: WinrateSource::Backtest,
            base_allocation: 1.0,
            adjusted_allocation: 0.75,
            leverage: 1.0,
            risk_status: RiskStatus::Normal,
            confidence_level: "medium".to_string(),
            last_adjustment_reason: "backtest win rate 58.0%".to_string(),
            recommendations: vec!["Keep position sizes modest".to_string()],
            updated_at: Utc::now(),
        };
        let text = format_risk(&state);
        assert!(text.contains("58.0% (backtest, medium confidence)"));
        assert!(text.contains("1.00 -> 0.75"));
        assert!(text.contains("  - Keep position sizes modest"));
    }

    #[test]
    fn test_format_report() {
        let since = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
        let outcome = Outcome {
            signal_id: Uuid::new_v4(),
            symbol: "BTCUSDT".to_string(),
            signal_type: SignalType::Buy,
            pattern_name: "P".to_string(),
            result: OutcomeResult::Win,
            pnl_percent: 2.0,
            exit_price: 102.0,
            exit_timestamp: since + chrono::Duration::days(1),
            manual: false,
        };
        let report = PerformanceReport::from_outcomes(7, since, &[outcome]);
        let text = format_report(&report);
        assert!(text.starts_with("Performance over the last 7 days (since 2024-03-01 00:00)"));
        assert!(text.contains("overall"));
        assert!(text.contains("BTCUSDT"));
    }
}
