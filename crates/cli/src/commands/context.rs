//! Shared wiring for every subcommand: configuration, store and services.

use anyhow::{Context, Result};
use cryptopulse_backtest::BacktestService;
use cryptopulse_core::{AppConfig, ConfigLoader};
use cryptopulse_data::{Database, Repositories};
use cryptopulse_pipeline::PipelineServices;
use cryptopulse_scheduler::PipelineScheduler;
use cryptopulse_web_api::AppState;
use std::path::Path;

pub struct AppContext {
    pub config: AppConfig,
    pub db: Database,
    pub repos: Repositories,
    pub services: PipelineServices,
    pub backtests: BacktestService,
}

impl AppContext {
    /// Loads configuration, opens the database and builds every stage.
    ///
    /// # Errors
    /// Returns an error if configuration is invalid or the database cannot be opened.
    pub async fn build(profile: Option<&str>) -> Result<Self> {
        let config = match profile {
            Some(profile) => ConfigLoader::load_with_profile(profile)?,
            None => ConfigLoader::load()?,
        };
        Self::from_config(config).await
    }

    /// # Errors
    /// Returns an error if the database cannot be opened or a stage cannot be built.
    pub async fn from_config(config: AppConfig) -> Result<Self> {
        ensure_sqlite_dir(&config.database.url)?;
        let db = Database::connect(&config.database.url, config.database.max_connections).await?;
        Self::with_database(config, db)
    }

    /// # Errors
    /// Returns an error if a stage cannot be built from `config`.
    pub fn with_database(config: AppConfig, db: Database) -> Result<Self> {
        let repos = db.repositories();
        let services = PipelineServices::from_config(&config, &repos)?;
        let backtests = BacktestService::from_config(
            &config,
            &repos,
            services.market.clone(),
            services.risk.clone(),
        )?;

        Ok(Self {
            config,
            db,
            repos,
            services,
            backtests,
        })
    }

    #[must_use]
    pub fn scheduler(&self) -> PipelineScheduler {
        PipelineScheduler::new(
            self.config.scheduler.clone(),
            self.services.clone(),
            self.backtests.clone(),
        )
    }

    #[must_use]
    pub fn api_state(&self) -> AppState {
        AppState::new(
            self.services.clone(),
            self.backtests.clone(),
            self.repos.clone(),
            self.db.clone(),
        )
    }

    #[must_use]
    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.config.server.host, self.config.server.port)
    }

    /// Upper-cased symbols, or the configured watchlist when none are given.
    #[must_use]
    pub fn symbols_or_watchlist(&self, symbols: &[String]) -> Vec<String> {
        if symbols.is_empty() {
            self.services.symbols.clone()
        } else {
            symbols.iter().map(|s| s.trim().to_uppercase()).collect()
        }
    }
}

/// Creates the parent directory of a file-backed `SQLite` URL.
fn ensure_sqlite_dir(url: &str) -> Result<()> {
    let Some(file_path) = url.strip_prefix("sqlite://") else {
        return Ok(());
    };
    let file_path = file_path.split('?').next().unwrap_or(file_path);
    if let Some(parent) = Path::new(file_path).parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
            tracing::debug!("Database directory ready: {}", parent.display());
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn context() -> AppContext {
        let db = Database::in_memory().await.unwrap();
        AppContext::with_database(AppConfig::default(), db).unwrap()
    }

    #[tokio::test]
    async fn test_symbols_or_watchlist() {
        let ctx = context().await;
        assert_eq!(
            ctx.symbols_or_watchlist(&[]),
            vec!["BTCUSDT".to_string(), "ETHUSDT".to_string()]
        );
        assert_eq!(
            ctx.symbols_or_watchlist(&[" solusdt".to_string()]),
            vec!["SOLUSDT".to_string()]
        );
    }

    #[tokio::test]
    async fn test_server_addr() {
        let ctx = context().await;
        assert_eq!(
            ctx.server_addr(),
            format!("{}:{}", ctx.config.server.host, ctx.config.server.port)
        );
    }

    #[test]
    fn test_ensure_sqlite_dir() {
        assert!(ensure_sqlite_dir("sqlite::memory:").is_ok());
        assert!(ensure_sqlite_dir("sqlite://cryptopulse.db").is_ok());

        let dir = std::env::temp_dir().join(format!("cryptopulse-cli-{}", std::process::id()));
        let url = format!("sqlite://{}/nested/pulse.db?mode=rwc", dir.display());
        ensure_sqlite_dir(&url).unwrap();
        assert!(dir.join("nested").is_dir());
        std::fs::remove_dir_all(&dir).unwrap();
    }
}
