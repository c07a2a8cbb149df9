use anyhow::{anyhow, Context, Result};
use chrono::{Duration, Utc};
use cryptopulse_backtest::{BacktestReport, BacktestService};
use cryptopulse_core::{RiskState, SchedulerConfig};
use cryptopulse_market_data::RetentionReport;
use cryptopulse_pipeline::{CycleOutcome, EvaluationSummary, PipelineServices, SymbolReport};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{error, info, warn};

/// A scheduled pipeline stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Synthesis,
    Evaluation,
    Backtest,
    Risk,
    Maintenance,
}

impl Stage {
    pub const ALL: [Self; 5] = [
        Self::Synthesis,
        Self::Evaluation,
        Self::Backtest,
        Self::Risk,
        Self::Maintenance,
    ];

    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Synthesis => "synthesis",
            Self::Evaluation => "evaluation",
            Self::Backtest => "backtest",
            Self::Risk => "risk",
            Self::Maintenance => "maintenance",
        }
    }

    const fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Stage {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "synthesis" => Ok(Self::Synthesis),
            "evaluation" => Ok(Self::Evaluation),
            "backtest" => Ok(Self::Backtest),
            "risk" => Ok(Self::Risk),
            "maintenance" => Ok(Self::Maintenance),
            _ => Err(anyhow!(
                "Invalid stage: {s}. Valid values: synthesis, evaluation, backtest, risk, maintenance"
            )),
        }
    }
}

/// What one stage run produced.
#[derive(Debug)]
pub enum StageReport {
    Synthesis(Vec<SymbolReport>),
    Evaluation(EvaluationSummary),
    Backtest(Vec<BacktestReport>),
    Risk(Vec<RiskState>),
    Maintenance(RetentionReport),
}

impl StageReport {
    /// One-line summary for logs and the CLI.
    #[must_use]
    pub fn summary(&self) -> String {
        match self {
            Self::Synthesis(reports) => {
                let persisted = reports
                    .iter()
                    .filter(|r| matches!(r.result, Ok(CycleOutcome::Persisted(_))))
                    .count();
                let failed = reports.iter().filter(|r| r.result.is_err()).count();
                format!(
                    "{} symbols, {} signals persisted, {} failed",
                    reports.len(),
                    persisted,
                    failed
                )
            }
            Self::Evaluation(s) => format!(
                "{} checked: {} wins, {} losses, {} neutral, {} open, {} errors",
                s.checked, s.wins, s.losses, s.neutrals, s.still_open, s.errors
            ),
            Self::Backtest(reports) => format!("{} backtests stored", reports.len()),
            Self::Risk(states) => format!("{} risk states updated", states.len()),
            Self::Maintenance(r) => format!(
                "{} expired cache entries and {} API calls pruned",
                r.cache_entries, r.api_calls
            ),
        }
    }
}

/// Cron-driven trigger of every pipeline stage.
///
/// Each stage holds a guard so a slow run is never overlapped by the next
/// tick of the same stage; the tick is skipped instead.
#[derive(Clone)]
pub struct PipelineScheduler {
    config: SchedulerConfig,
    services: PipelineServices,
    backtests: BacktestService,
    running: Arc<[Mutex<()>; 5]>,
}

impl PipelineScheduler {
    #[must_use]
    pub fn new(
        config: SchedulerConfig,
        services: PipelineServices,
        backtests: BacktestService,
    ) -> Self {
        Self {
            config,
            services,
            backtests,
            running: Arc::new(std::array::from_fn(|_| Mutex::new(()))),
        }
    }

    #[must_use]
    pub fn cron_for(&self, stage: Stage) -> &str {
        match stage {
            Stage::Synthesis => &self.config.synthesis_cron,
            Stage::Evaluation => &self.config.evaluation_cron,
            Stage::Backtest => &self.config.backtest_cron,
            Stage::Risk => &self.config.risk_cron,
            Stage::Maintenance => &self.config.maintenance_cron,
        }
    }

    /// Builds one cron job per stage.
    ///
    /// # Errors
    /// Returns an error naming the stage whose cron expression is invalid.
    pub fn jobs(&self) -> Result<Vec<Job>> {
        Stage::ALL
            .iter()
            .map(|&stage| {
                let cron = self.cron_for(stage).to_string();
                let this = self.clone();
                Job::new_async(cron.as_str(), move |_uuid, _lock| {
                    let this = this.clone();
                    Box::pin(async move {
                        this.trigger(stage).await;
                    })
                })
                .with_context(|| format!("invalid {stage} cron expression: {cron}"))
            })
            .collect()
    }

    /// Starts the scheduler. Jobs run until the returned handle is shut down
    /// or dropped with the runtime.
    ///
    /// # Errors
    /// Returns an error if the scheduler fails to start or if job scheduling fails.
    pub async fn start(self) -> Result<JobScheduler> {
        let jobs = self.jobs()?;
        let scheduler = JobScheduler::new().await?;
        for job in jobs {
            scheduler.add(job).await?;
        }
        scheduler.start().await?;

        for stage in Stage::ALL {
            info!("Scheduled {} at '{}'", stage, self.cron_for(stage));
        }
        info!(
            "Pipeline scheduler started for {} symbols",
            self.services.symbols.len()
        );
        Ok(scheduler)
    }

    /// Runs a stage unless a previous run of it is still in progress.
    /// Returns whether the stage ran.
    pub async fn trigger(&self, stage: Stage) -> bool {
        let Ok(_guard) = self.running[stage.index()].try_lock() else {
            warn!("{} still running; skipping tick", stage);
            return false;
        };

        match self.run_once(stage).await {
            Ok(report) => info!("{} finished: {}", stage, report.summary()),
            Err(e) => error!("{} failed: {:#}", stage, e),
        }
        true
    }

    /// Runs a stage immediately over the configured watchlist.
    ///
    /// # Errors
    /// Returns an error if the stage itself fails; per-symbol failures are
    /// carried inside the report.
    pub async fn run_once(&self, stage: Stage) -> Result<StageReport> {
        let now = Utc::now();
        let symbols = &self.services.symbols;

        Ok(match stage {
            Stage::Synthesis => StageReport::Synthesis(self.services.cycle.run(symbols, now).await?),
            Stage::Evaluation => StageReport::Evaluation(self.services.evaluation.run(now).await?),
            // Each stored backtest refreshes the symbol's risk state
            Stage::Backtest => StageReport::Backtest(self.backtests.run_all(symbols, now).await),
            Stage::Risk => StageReport::Risk(self.services.risk.recompute_all(symbols, now).await),
            Stage::Maintenance => StageReport::Maintenance(
                self.services
                    .market
                    .prune(now, Duration::hours(self.config.api_call_retention_hours))
                    .await?,
            ),
        })
    }
}
