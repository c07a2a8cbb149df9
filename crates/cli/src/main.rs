use clap::{Parser, Subcommand};

mod commands;

use commands::{
    AppContext, BacktestArgs, ReportArgs, RiskArgs, StreamArgs, SynthesizeArgs,
};

#[derive(Parser)]
#[command(name = "cryptopulse")]
#[command(about = "Crypto trading-signal pipeline", long_about = None)]
struct Cli {
    /// Config profile overlay (config/Config.<profile>.toml)
    #[arg(long, global = true, env = "CRYPTOPULSE_PROFILE")]
    profile: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the scheduler together with the web API
    Run,
    /// Start the web API server only
    Serve {
        /// Server address (defaults to server.host:server.port)
        #[arg(short, long)]
        addr: Option<String>,
    },
    /// Run one synthesis cycle
    Synthesize(SynthesizeArgs),
    /// Evaluate matured signals once
    Evaluate,
    /// Backtest a symbol over live or CSV history
    Backtest(BacktestArgs),
    /// Recompute and show the risk state of a symbol
    Risk(RiskArgs),
    /// Performance report over recent outcomes
    Report(ReportArgs),
    /// Stream live tickers into the cache
    Stream(StreamArgs),
    /// Check database and provider health
    Health,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let ctx = AppContext::build(cli.profile.as_deref()).await?;

    match cli.command {
        Commands::Run => commands::run_daemon(ctx).await?,
        Commands::Serve { addr } => commands::run_server(ctx, addr).await?,
        Commands::Synthesize(args) => commands::run_synthesize(&ctx, args).await?,
        Commands::Evaluate => commands::run_evaluate(&ctx).await?,
        Commands::Backtest(args) => commands::run_backtest(&ctx, args).await?,
        Commands::Risk(args) => commands::run_risk(&ctx, args).await?,
        Commands::Report(args) => commands::run_report(&ctx, args).await?,
        Commands::Stream(args) => commands::run_stream(&ctx, args).await?,
        Commands::Health => commands::run_health(&ctx).await?,
    }

    Ok(())
}
