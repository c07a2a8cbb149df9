use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use cryptopulse_backtest::BacktestReport;
use cryptopulse_core::{
    Outcome, OutcomeResult, PatternRecord, ReputationRecord, RiskState, Signal, SignalStatus,
    SignalType,
};
use cryptopulse_data::{SignalFilter, StoredBacktestRun};
use cryptopulse_pipeline::{Feedback, PerformanceReport};
use serde::Deserialize;
use uuid::Uuid;

use crate::error::ApiError;
use crate::state::AppState;

const MAX_LIMIT: i64 = 500;

/// Upper-cases and validates a path or body symbol.
fn normalize_symbol(raw: &str) -> Result<String, ApiError> {
    let symbol = raw.trim().to_ascii_uppercase();
    if symbol.is_empty() || !symbol.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(ApiError::BadRequest(format!("invalid symbol: {raw:?}")));
    }
    Ok(symbol)
}

fn parse_param<T: std::str::FromStr<Err = anyhow::Error>>(
    raw: Option<&str>,
) -> Result<Option<T>, ApiError> {
    raw.map(|s| s.parse::<T>().map_err(|e| ApiError::BadRequest(e.to_string())))
        .transpose()
}

// ============================================
// Signals
// ============================================

#[derive(Debug, Deserialize)]
pub struct ActiveQuery {
    pub symbol: Option<String>,
}

/// GET /api/signals/active
///
/// # Errors
/// Returns 400 for an invalid symbol and 500 if the store cannot be read.
pub async fn list_active(
    State(state): State<AppState>,
    Query(query): Query<ActiveQuery>,
) -> Result<Json<Vec<Signal>>, ApiError> {
    let symbol = query.symbol.as_deref().map(normalize_symbol).transpose()?;
    let signals = state.services.lifecycle.list_active(symbol.as_deref()).await?;
    Ok(Json(signals))
}

#[derive(Debug, Deserialize)]
pub struct SignalQuery {
    pub symbol: Option<String>,
    pub status: Option<String>,
    pub signal_type: Option<String>,
    pub since: Option<DateTime<Utc>>,
    pub limit: Option<i64>,
}

/// GET /api/signals
///
/// # Errors
/// Returns 400 for an unknown status or type and 500 if the store cannot be read.
pub async fn list_signals(
    State(state): State<AppState>,
    Query(query): Query<SignalQuery>,
) -> Result<Json<Vec<Signal>>, ApiError> {
    let filter = SignalFilter {
        symbol: query.symbol.as_deref().map(normalize_symbol).transpose()?,
        status: parse_param::<SignalStatus>(query.status.as_deref())?,
        signal_type: parse_param::<SignalType>(query.signal_type.as_deref())?,
        since: query.since,
        limit: query
            .limit
            .unwrap_or(SignalFilter::default().limit)
            .clamp(1, MAX_LIMIT),
    };
    Ok(Json(state.services.lifecycle.history(&filter).await?))
}

/// GET /api/signals/:id
///
/// # Errors
/// Returns 404 for an unknown id.
pub async fn get_signal(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Signal>, ApiError> {
    state
        .services
        .lifecycle
        .get(id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("signal {id}")))
}

/// POST /api/signals/:id/take
///
/// # Errors
/// Returns 404 for an unknown id and 409 when the signal is no longer active.
pub async fn take_signal(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Signal>, ApiError> {
    Ok(Json(state.services.lifecycle.mark_taken(id).await?))
}

#[derive(Debug, Deserialize)]
pub struct FeedbackRequest {
    /// win, loss (or lose) and neutral, any case
    pub result: String,
    pub pnl_percent: Option<f64>,
    pub exit_price: Option<f64>,
}

/// POST /api/signals/:id/feedback
///
/// # Errors
/// Returns 400 for an unknown result or a non-positive exit price, 404 for an
/// unknown id and 409 unless the signal was taken and has no outcome yet.
pub async fn record_feedback(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<FeedbackRequest>,
) -> Result<Json<Outcome>, ApiError> {
    let result: OutcomeResult = req
        .result
        .parse()
        .map_err(|e: anyhow::Error| ApiError::BadRequest(e.to_string()))?;
    let feedback = Feedback {
        result,
        pnl_percent: req.pnl_percent,
        exit_price: req.exit_price,
    };

    let outcome = state
        .services
        .lifecycle
        .record_feedback(id, &feedback, Utc::now())
        .await?;
    Ok(Json(outcome))
}

// ============================================
// Learning and risk
// ============================================

/// GET /api/risk/:symbol
///
/// A symbol never assessed before is assessed on the spot.
///
/// # Errors
/// Returns 500 if the risk inputs cannot be read.
pub async fn get_risk(
    State(state): State<AppState>,
    Path(symbol): Path<String>,
) -> Result<Json<RiskState>, ApiError> {
    let symbol = normalize_symbol(&symbol)?;
    let risk = &state.services.risk;
    let current = match risk.get(&symbol).await? {
        Some(stored) => stored,
        None => risk.recompute(&symbol, Utc::now()).await?,
    };
    Ok(Json(current))
}

/// GET /api/reputation/:symbol
///
/// # Errors
/// Returns 500 if the store cannot be read.
pub async fn get_reputation(
    State(state): State<AppState>,
    Path(symbol): Path<String>,
) -> Result<Json<ReputationRecord>, ApiError> {
    let symbol = normalize_symbol(&symbol)?;
    Ok(Json(state.repos.reputation.get_or_neutral(&symbol).await?))
}

#[derive(Debug, Deserialize)]
pub struct LimitQuery {
    pub limit: Option<i64>,
}

/// GET /api/patterns
///
/// # Errors
/// Returns 500 if the store cannot be read.
pub async fn list_patterns(
    State(state): State<AppState>,
    Query(query): Query<LimitQuery>,
) -> Result<Json<Vec<PatternRecord>>, ApiError> {
    let limit = query.limit.unwrap_or(20).clamp(1, MAX_LIMIT);
    Ok(Json(state.services.learning.top_patterns(limit).await?))
}

#[derive(Debug, Deserialize)]
pub struct PerformanceQuery {
    pub days: Option<i64>,
}

/// GET /api/performance
///
/// # Errors
/// Returns 500 if the outcomes cannot be read.
pub async fn performance(
    State(state): State<AppState>,
    Query(query): Query<PerformanceQuery>,
) -> Result<Json<PerformanceReport>, ApiError> {
    let days = query.days.unwrap_or(30).clamp(1, 365);
    Ok(Json(
        state
            .services
            .learning
            .performance_report(days, Utc::now())
            .await?,
    ))
}

// ============================================
// Backtests
// ============================================

#[derive(Debug, Deserialize)]
pub struct BacktestRequest {
    pub symbol: String,
    pub days: Option<i64>,
}

/// POST /api/backtests
///
/// # Errors
/// Returns 503 when no history is available, 422 when it is too short and
/// 500 if the run cannot be stored.
pub async fn run_backtest(
    State(state): State<AppState>,
    Json(req): Json<BacktestRequest>,
) -> Result<(StatusCode, Json<BacktestReport>), ApiError> {
    let symbol = normalize_symbol(&req.symbol)?;
    let days = req.days.unwrap_or_else(|| state.backtests.default_days());
    let report = state.backtests.run(&symbol, days, Utc::now()).await?;
    Ok((StatusCode::CREATED, Json(report)))
}

/// GET /api/backtests/:symbol
///
/// # Errors
/// Returns 500 if the store cannot be read.
pub async fn list_backtests(
    State(state): State<AppState>,
    Path(symbol): Path<String>,
    Query(query): Query<LimitQuery>,
) -> Result<Json<Vec<StoredBacktestRun>>, ApiError> {
    let symbol = normalize_symbol(&symbol)?;
    let limit = query.limit.unwrap_or(10).clamp(1, 100);
    Ok(Json(
        state.repos.backtests.list_for_symbol(&symbol, limit).await?,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_symbol() {
        assert_eq!(normalize_symbol(" btcusdt ").unwrap(), "BTCUSDT");
        assert!(normalize_symbol("").is_err());
        assert!(normalize_symbol("BTC/USDT").is_err());
    }

    #[test]
    fn test_parse_param() {
        assert_eq!(
            parse_param::<SignalStatus>(Some("Taken")).unwrap(),
            Some(SignalStatus::Taken)
        );
        assert_eq!(parse_param::<SignalType>(None).unwrap(), None);
        assert!(parse_param::<SignalType>(Some("hold")).is_err());
    }
}
