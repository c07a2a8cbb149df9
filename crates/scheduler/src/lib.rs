//! Cron scheduling of the cryptopulse pipeline stages.

pub mod scheduler;

pub use scheduler::{PipelineScheduler, Stage, StageReport};
