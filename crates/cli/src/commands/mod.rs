//! Subcommands of the `cryptopulse` binary.

pub mod backtest;
pub mod context;
pub mod daemon;
pub mod health;
pub mod pipeline;
pub mod stream;

pub use backtest::{run_backtest, BacktestArgs};
pub use context::AppContext;
pub use daemon::{run_daemon, run_server};
pub use health::run_health;
pub use pipeline::{
    run_evaluate, run_report, run_risk, run_synthesize, ReportArgs, RiskArgs, SynthesizeArgs,
};
pub use stream::{run_stream, StreamArgs};
