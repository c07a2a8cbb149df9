use super::{from_millis, to_millis};
use anyhow::{Context, Result};
use cryptopulse_core::{Outcome, Signal};
use uuid::Uuid;

/// Row of the `signals` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct SignalRow {
    pub id: String,
    pub symbol: String,
    pub signal_type: String,
    pub confidence: f64,
    pub entry_price: f64,
    pub take_profit: f64,
    pub stop_loss: f64,
    pub horizon_minutes: i64,
    pub pattern_name: String,
    pub reason: String,
    pub source: String,
    pub status: String,
    pub indicators_json: Option<String>,
    pub created_at: i64,
    pub evaluated_at: Option<i64>,
}

impl SignalRow {
    /// Flattens a domain signal into column values.
    ///
    /// # Errors
    /// Returns an error if the indicator audit blob cannot be serialized.
    pub fn from_signal(signal: &Signal) -> Result<Self> {
        let indicators_json = signal
            .indicators
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        Ok(Self {
            id: signal.id.to_string(),
            symbol: signal.symbol.clone(),
            signal_type: signal.signal_type.as_str().to_string(),
            confidence: signal.confidence,
            entry_price: signal.entry_price,
            take_profit: signal.take_profit,
            stop_loss: signal.stop_loss,
            horizon_minutes: signal.horizon_minutes,
            pattern_name: signal.pattern_name.clone(),
            reason: signal.reason.clone(),
            source: signal.source.as_str().to_string(),
            status: signal.status.as_str().to_string(),
            indicators_json,
            created_at: to_millis(signal.created_at),
            evaluated_at: signal.evaluated_at.map(to_millis),
        })
    }
}

impl TryFrom<SignalRow> for Signal {
    type Error = anyhow::Error;

    fn try_from(row: SignalRow) -> Result<Self> {
        let indicators = row
            .indicators_json
            .as_deref()
            .map(serde_json::from_str)
            .transpose()
            .context("corrupt indicators_json")?;

        Ok(Self {
            id: Uuid::parse_str(&row.id).with_context(|| format!("bad signal id {}", row.id))?,
            symbol: row.symbol,
            signal_type: row.signal_type.parse()?,
            confidence: row.confidence,
            entry_price: row.entry_price,
            take_profit: row.take_profit,
            stop_loss: row.stop_loss,
            horizon_minutes: row.horizon_minutes,
            pattern_name: row.pattern_name,
            reason: row.reason,
            source: row.source.parse()?,
            status: row.status.parse()?,
            indicators,
            created_at: from_millis(row.created_at)?,
            evaluated_at: row.evaluated_at.map(from_millis).transpose()?,
        })
    }
}

/// Row of the `outcomes` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct OutcomeRow {
    pub signal_id: String,
    pub symbol: String,
    pub signal_type: String,
    pub pattern_name: String,
    pub result: String,
    pub pnl_percent: f64,
    pub exit_price: f64,
    pub exit_timestamp: i64,
    pub manual: bool,
}

impl TryFrom<OutcomeRow> for Outcome {
    type Error = anyhow::Error;

    fn try_from(row: OutcomeRow) -> Result<Self> {
        Ok(Self {
            signal_id: Uuid::parse_str(&row.signal_id)?,
            symbol: row.symbol,
            signal_type: row.signal_type.parse()?,
            pattern_name: row.pattern_name,
            result: row.result.parse()?,
            pnl_percent: row.pnl_percent,
            exit_price: row.exit_price,
            exit_timestamp: from_millis(row.exit_timestamp)?,
            manual: row.manual,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use cryptopulse_core::{
        CandidateSignal, IndicatorSet, SignalSource, SignalStatus, SignalType,
    };

    #[test]
    fn test_signal_row_conversion_preserves_fields() {
        let created = Utc.with_ymd_and_hms(2025, 3, 1, 8, 0, 0).unwrap();
        let signal = Signal::from_candidate(
            CandidateSignal {
                symbol: "ETHUSDT".to_string(),
                signal_type: SignalType::Sell,
                confidence: 77.5,
                entry_price: 3000.0,
                take_profit: 2940.0,
                stop_loss: 3030.0,
                pattern_name: "RSI_overbought_MACD_bearish_EMA_downtrend_NEWS_neutral"
                    .to_string(),
                reason: "rsi overbought".to_string(),
                source: SignalSource::Advisory,
                indicators: IndicatorSet {
                    rsi: 72.0,
                    ..IndicatorSet::default()
                },
            },
            240,
            created,
        );

        let row = SignalRow::from_signal(&signal).unwrap();
        assert_eq!(row.signal_type, "SELL");
        assert_eq!(row.status, "active");
        assert_eq!(row.source, "advisory");

        let back = Signal::try_from(row).unwrap();
        assert_eq!(back, signal);
        assert_eq!(back.status, SignalStatus::Active);
    }
}
