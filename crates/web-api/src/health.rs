//! Health endpoint for monitoring the store and the provider chain.
//!
//! Provides `/api/health`, reporting database liveness, per-provider call
//! statistics over the last hour and an overall status.

use axum::{extract::State, http::StatusCode, Json};
use chrono::{DateTime, Duration, Utc};
use cryptopulse_data::ProviderCallStats;
use serde::Serialize;

use crate::state::AppState;

/// Health of one market-data provider over the last hour.
#[derive(Debug, Clone, Serialize)]
pub struct ProviderHealth {
    pub provider: String,
    pub calls: i64,
    /// Percentage of successful calls
    pub success_rate: f64,
    pub timeouts: i64,
    pub avg_latency_ms: f64,
    /// "healthy", "degraded", "unhealthy" or "idle"
    pub status: String,
}

impl ProviderHealth {
    #[must_use]
    pub fn from_stats(stats: &ProviderCallStats) -> Self {
        Self {
            provider: stats.provider.clone(),
            calls: stats.total,
            success_rate: stats.success_rate(),
            timeouts: stats.timeouts,
            avg_latency_ms: stats.avg_latency_ms,
            status: determine_status(stats).to_string(),
        }
    }
}

/// Overall health response.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: DateTime<Utc>,
    pub uptime_secs: i64,
    /// "ok" or "unavailable"
    pub database: String,
    pub configured_providers: Vec<String>,
    pub providers: Vec<ProviderHealth>,
    pub signals_last_24h: i64,
}

/// Success-rate thresholds in percent.
const HEALTHY_SUCCESS_RATE: f64 = 90.0;
const DEGRADED_SUCCESS_RATE: f64 = 50.0;

/// Classifies one provider by its success rate.
#[must_use]
pub fn determine_status(stats: &ProviderCallStats) -> &'static str {
    if stats.total == 0 {
        return "idle";
    }
    let rate = stats.success_rate();
    if rate >= HEALTHY_SUCCESS_RATE {
        "healthy"
    } else if rate >= DEGRADED_SUCCESS_RATE {
        "degraded"
    } else {
        "unhealthy"
    }
}

/// Unhealthy without a database; degraded while any provider struggles.
#[must_use]
pub fn overall_status(database_ok: bool, providers: &[ProviderHealth]) -> &'static str {
    if !database_ok {
        "unhealthy"
    } else if providers
        .iter()
        .any(|p| p.status == "degraded" || p.status == "unhealthy")
    {
        "degraded"
    } else {
        "healthy"
    }
}

/// GET /api/health
///
/// Answers 503 when the database is unreachable, 200 otherwise.
pub async fn health(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let now = Utc::now();

    let database_ok = match state.db.ping().await {
        Ok(()) => true,
        Err(e) => {
            tracing::error!("Database ping failed: {:#}", e);
            false
        }
    };

    let stats = if database_ok {
        state
            .repos
            .api_calls
            .stats_since(now - Duration::hours(1))
            .await
            .unwrap_or_else(|e| {
                tracing::warn!("Provider stats unavailable: {:#}", e);
                Vec::new()
            })
    } else {
        Vec::new()
    };

    let providers: Vec<ProviderHealth> = stats.iter().map(ProviderHealth::from_stats).collect();

    let signals_last_24h = if database_ok {
        state
            .repos
            .signals
            .count_created_since(now - Duration::hours(24))
            .await
            .unwrap_or(0)
    } else {
        0
    };

    let status = overall_status(database_ok, &providers);
    let code = if database_ok {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        code,
        Json(HealthResponse {
            status: status.to_string(),
            timestamp: now,
            uptime_secs: (now - state.started_at).num_seconds(),
            database: if database_ok { "ok" } else { "unavailable" }.to_string(),
            configured_providers: state.services.market.provider_ids(),
            providers,
            signals_last_24h,
        }),
    )
}
