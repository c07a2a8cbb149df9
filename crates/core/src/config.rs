use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub market_data: MarketDataConfig,
    pub advisory: AdvisoryConfig,
    pub pipeline: PipelineConfig,
    pub rules: RuleConfig,
    pub targets: TargetConfig,
    pub learning: LearningConfig,
    pub risk: RiskConfig,
    pub backtest: BacktestConfig,
    pub scheduler: SchedulerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://cryptopulse.db".to_string(),
            max_connections: 5,
        }
    }
}

/// Kind of market-data provider behind a config entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    Binance,
    Coingecko,
}

/// One entry of the ordered provider chain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub id: String,
    pub kind: ProviderKind,
    pub base_url: String,
    /// Cache TTL for successful responses
    pub cache_ttl_secs: u64,
    pub requests_per_second: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NewsConfig {
    pub enabled: bool,
    pub base_url: String,
    pub api_token: Option<String>,
    pub cache_ttl_secs: u64,
}

impl Default for NewsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            base_url: "https://cryptopanic.com/api/v1".to_string(),
            api_token: None,
            cache_ttl_secs: 900,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    pub url: String,
    pub max_reconnect_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    /// TTL of snapshots written to the cache by the stream
    pub cache_ttl_secs: u64,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            url: "wss://stream.binance.com:9443".to_string(),
            max_reconnect_attempts: 5,
            base_delay_ms: 1_000,
            max_delay_ms: 30_000,
            cache_ttl_secs: 120,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MarketDataConfig {
    /// Tried in order; first success wins
    pub providers: Vec<ProviderConfig>,
    pub request_timeout_secs: u64,
    /// Timeout for candle history requests
    pub history_timeout_secs: u64,
    /// Candle interval used by synthesis and backtests (e.g. "1h")
    pub candle_interval: String,
    pub candle_count: usize,
    /// Symbol to CoinGecko coin id
    pub coingecko_ids: HashMap<String, String>,
    pub news: NewsConfig,
    pub stream: StreamConfig,
}

impl Default for MarketDataConfig {
    fn default() -> Self {
        let coingecko_ids = [
            ("BTCUSDT", "bitcoin"),
            ("ETHUSDT", "ethereum"),
            ("SOLUSDT", "solana"),
            ("BNBUSDT", "binancecoin"),
            ("XRPUSDT", "ripple"),
        ]
        .into_iter()
        .map(|(s, id)| (s.to_string(), id.to_string()))
        .collect();

        Self {
            providers: vec![
                ProviderConfig {
                    id: "binance".to_string(),
                    kind: ProviderKind::Binance,
                    base_url: "https://api.binance.com".to_string(),
                    cache_ttl_secs: 600,
                    requests_per_second: 10,
                },
                ProviderConfig {
                    id: "binance-gateway".to_string(),
                    kind: ProviderKind::Binance,
                    base_url: "https://api-gateway.binance.com".to_string(),
                    cache_ttl_secs: 600,
                    requests_per_second: 10,
                },
                ProviderConfig {
                    id: "coingecko".to_string(),
                    kind: ProviderKind::Coingecko,
                    base_url: "https://api.coingecko.com/api/v3".to_string(),
                    cache_ttl_secs: 900,
                    requests_per_second: 1,
                },
            ],
            request_timeout_secs: 10,
            history_timeout_secs: 30,
            candle_interval: "1h".to_string(),
            candle_count: 100,
            coingecko_ids,
            news: NewsConfig::default(),
            stream: StreamConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AdvisoryConfig {
    pub enabled: bool,
    pub endpoint: String,
    pub api_key: Option<String>,
    pub timeout_secs: u64,
    /// Below this reputation score advisory opinions are ignored
    pub min_reputation: f64,
}

impl Default for AdvisoryConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            endpoint: "http://localhost:8787/v1/advise".to_string(),
            api_key: None,
            timeout_secs: 20,
            min_reputation: 30.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Watchlist processed by scheduled cycles
    pub symbols: Vec<String>,
    pub horizon_minutes: i64,
    /// Signals younger than min(this, horizon) are not evaluated
    pub evaluation_min_age_minutes: i64,
    pub cycle_timeout_secs: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            symbols: vec!["BTCUSDT".to_string(), "ETHUSDT".to_string()],
            horizon_minutes: 240,
            evaluation_min_age_minutes: 60,
            cycle_timeout_secs: 120,
        }
    }
}

/// Thresholds of the deterministic rule channel and safety corrections.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuleConfig {
    pub buy_rsi_max: f64,
    pub sell_rsi_min: f64,
    pub overbought_rsi: f64,
    pub oversold_rsi: f64,
    pub min_volume_ratio: f64,
    /// Distance to EMA50 (percent) still counted as "near"
    pub ema_proximity_pct: f64,
    pub base_confidence: f64,
    pub wait_confidence: f64,
    /// Confidence floor of a safety-forced signal
    pub forced_confidence: f64,
    /// Candidates below this are turned into WAIT
    pub confidence_threshold: f64,
}

impl Default for RuleConfig {
    fn default() -> Self {
        Self {
            buy_rsi_max: 40.0,
            sell_rsi_min: 60.0,
            overbought_rsi: 70.0,
            oversold_rsi: 30.0,
            min_volume_ratio: 1.0,
            ema_proximity_pct: 0.5,
            base_confidence: 70.0,
            wait_confidence: 50.0,
            forced_confidence: 70.0,
            confidence_threshold: 65.0,
        }
    }
}

/// Take-profit / stop-loss derivation parameters (percentages).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TargetConfig {
    pub take_profit_pct: f64,
    pub stop_loss_pct: f64,
    pub high_reputation: f64,
    pub low_reputation: f64,
    /// Fractional widening/tightening applied by reputation
    pub reputation_adjustment: f64,
    /// 24h range (percent of price) above which targets widen
    pub volatility_range_pct: f64,
    pub volatility_adjustment: f64,
    /// Minimum TP distance used when correcting an invalid target
    pub min_tp_offset_pct: f64,
}

impl Default for TargetConfig {
    fn default() -> Self {
        Self {
            take_profit_pct: 2.0,
            stop_loss_pct: 1.0,
            high_reputation: 70.0,
            low_reputation: 50.0,
            reputation_adjustment: 0.2,
            volatility_range_pct: 5.0,
            volatility_adjustment: 0.25,
            min_tp_offset_pct: 0.5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LearningConfig {
    /// Occurrences before a pattern earns a confidence boost
    pub min_pattern_occurrences: i64,
    pub max_confidence_boost: f64,
    pub report_days: i64,
}

impl Default for LearningConfig {
    fn default() -> Self {
        Self {
            min_pattern_occurrences: 5,
            max_confidence_boost: 10.0,
            report_days: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskConfig {
    pub base_allocation: f64,
    pub backtest_min_signals: i64,
    pub backtest_max_age_hours: i64,
    pub live_min_outcomes: usize,
    pub live_window: usize,
    pub default_winrate: f64,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            base_allocation: 1.0,
            backtest_min_signals: 20,
            backtest_max_age_hours: 72,
            live_min_outcomes: 10,
            live_window: 30,
            default_winrate: 50.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BacktestConfig {
    pub default_days: i64,
    /// Indicator window length in candles
    pub window: usize,
    /// Patterns need this many trades to rank best/worst
    pub min_pattern_occurrences: usize,
}

impl Default for BacktestConfig {
    fn default() -> Self {
        Self {
            default_days: 30,
            window: 50,
            min_pattern_occurrences: 5,
        }
    }
}

/// Cron expressions (with seconds) for each scheduled stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub synthesis_cron: String,
    pub evaluation_cron: String,
    pub backtest_cron: String,
    pub risk_cron: String,
    /// Purges expired cache entries and old provider call logs
    pub maintenance_cron: String,
    pub api_call_retention_hours: i64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            synthesis_cron: "0 */10 * * * *".to_string(),
            evaluation_cron: "0 5 * * * *".to_string(),
            backtest_cron: "0 0 3 */2 * *".to_string(),
            risk_cron: "0 30 */6 * * *".to_string(),
            maintenance_cron: "0 15 * * * *".to_string(),
            api_call_retention_hours: 168,
        }
    }
}
