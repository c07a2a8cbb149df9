use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, TimeZone, Utc};
use cryptopulse_core::{Candle, CandleSeries, Interval};
use std::io::Read;
use std::path::Path;

/// Offline candle history loaded from CSV.
///
/// Expected columns, with a header row: `timestamp,open,high,low,close,volume`.
/// Timestamps are RFC 3339 strings or epoch milliseconds.
pub struct HistoricalDataProvider;

impl HistoricalDataProvider {
    /// Loads a candle series from a CSV file.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The CSV file cannot be opened
    /// - A row has fewer than six columns
    /// - Timestamp or price parsing fails
    pub fn from_csv(path: impl AsRef<Path>, symbol: &str, interval: Interval) -> Result<CandleSeries> {
        let path = path.as_ref();
        let reader = csv::Reader::from_path(path)
            .with_context(|| format!("failed to open {}", path.display()))?;
        Self::read(reader, symbol, interval)
    }

    /// Loads a candle series from any CSV reader.
    ///
    /// # Errors
    ///
    /// Returns an error on malformed rows.
    pub fn from_reader<R: Read>(input: R, symbol: &str, interval: Interval) -> Result<CandleSeries> {
        Self::read(csv::Reader::from_reader(input), symbol, interval)
    }

    fn read<R: Read>(
        mut reader: csv::Reader<R>,
        symbol: &str,
        interval: Interval,
    ) -> Result<CandleSeries> {
        let mut candles = Vec::new();

        for (row, result) in reader.records().enumerate() {
            let record = result?;
            if record.len() < 6 {
                return Err(anyhow!("row {}: expected 6 columns, got {}", row + 1, record.len()));
            }

            let field = |i: usize| -> Result<f64> {
                record[i]
                    .trim()
                    .parse::<f64>()
                    .with_context(|| format!("row {}: bad number {:?}", row + 1, &record[i]))
            };

            candles.push(Candle {
                timestamp: parse_timestamp(record[0].trim())
                    .with_context(|| format!("row {}: bad timestamp", row + 1))?,
                open: field(1)?,
                high: field(2)?,
                low: field(3)?,
                close: field(4)?,
                volume: field(5)?,
            });
        }

        // Sorted chronologically by the series constructor
        Ok(CandleSeries::new(symbol, interval, candles))
    }
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    if let Ok(millis) = raw.parse::<i64>() {
        return Utc
            .timestamp_millis_opt(millis)
            .single()
            .ok_or_else(|| anyhow!("timestamp {millis} out of range"));
    }
    Ok(raw.parse::<DateTime<Utc>>()?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reads_rfc3339_and_millis_sorted() {
        let csv = "timestamp,open,high,low,close,volume\n\
                   2025-01-01T01:00:00Z,101,102,100,101.5,10\n\
                   1735689600000,100,101,99,100.5,12\n";

        let series = HistoricalDataProvider::from_reader(csv.as_bytes(), "BTCUSDT", Interval::H1)
            .unwrap();

        assert_eq!(series.len(), 2);
        assert_eq!(series.symbol, "BTCUSDT");
        assert_eq!(series.candles[0].close, 100.5);
        assert_eq!(series.candles[1].close, 101.5);
        assert_eq!(series.candles[0].timestamp.to_rfc3339(), "2025-01-01T00:00:00+00:00");
    }

    #[test]
    fn test_rejects_bad_number() {
        let csv = "timestamp,open,high,low,close,volume\n\
                   2025-01-01T00:00:00Z,100,abc,99,100,10\n";

        let err = HistoricalDataProvider::from_reader(csv.as_bytes(), "BTCUSDT", Interval::H1)
            .unwrap_err();
        assert!(err.to_string().contains("row 1"));
    }

    #[test]
    fn test_rejects_short_row() {
        let csv = "timestamp,open,high,low,close,volume\n2025-01-01T00:00:00Z,100\n";

        assert!(
            HistoricalDataProvider::from_reader(csv.as_bytes(), "BTCUSDT", Interval::H1).is_err()
        );
    }
}
