//! Market data module.
//!
//! Daily bars, the validated bar series every analyzer consumes, and the
//! contracts for the external market-data and fundamentals sources.
//!
//! # Data Sources
//! - **LocalBarStore**: a directory of per-ticker JSON files
//! - **InMemoryProvider**: preloaded series for tests and embedding

mod local_store;
mod provider;

pub use local_store::{InMemoryProvider, LocalBarStore, TickerFile};
pub use provider::{
    BarProvider, FundamentalData, FundamentalSnapshot, FundamentalsProvider, IncomeStatement,
    OwnershipSnapshot,
};

use chrono::NaiveDate;
use sentinel_common::Error;
use serde::{Deserialize, Serialize};

// ============================================================================
// Core Data Types
// ============================================================================

/// A single daily bar (OHLCV)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    /// Session date
    pub date: NaiveDate,
    /// Open price
    pub open: f64,
    /// High price
    pub high: f64,
    /// Low price
    pub low: f64,
    /// Close price
    pub close: f64,
    /// Volume (zero is a legitimate value)
    #[serde(default)]
    pub volume: f64,
}

impl Bar {
    /// Get the full range (high - low)
    pub fn range(&self) -> f64 {
        self.high - self.low
    }

    /// Where the close sits inside the range, 0.0 at the low and 1.0 at the high.
    ///
    /// `None` for a zero-range bar.
    pub fn close_location(&self) -> Option<f64> {
        let range = self.range();
        (range != 0.0).then(|| (self.close - self.low) / range)
    }

    /// Signed body size normalized by the range. `None` for a zero-range bar.
    pub fn body_strength(&self) -> Option<f64> {
        let range = self.range();
        (range != 0.0).then(|| (self.close - self.open) / range)
    }

    fn check(&self) -> Result<(), String> {
        let prices = [
            ("open", self.open),
            ("high", self.high),
            ("low", self.low),
            ("close", self.close),
        ];
        for (name, value) in prices {
            if !value.is_finite() || value <= 0.0 {
                return Err(format!("{name} must be a positive number, got {value}"));
            }
        }
        if self.high < self.low {
            return Err(format!("high {} is below low {}", self.high, self.low));
        }
        for (name, value) in [("open", self.open), ("close", self.close)] {
            if value < self.low || value > self.high {
                return Err(format!(
                    "{name} {value} is outside the range [{}, {}]",
                    self.low, self.high
                ));
            }
        }
        if !self.volume.is_finite() || self.volume < 0.0 {
            return Err(format!("volume must not be negative, got {}", self.volume));
        }
        Ok(())
    }
}

/// The ordered daily bars of one security.
///
/// Dates are strictly increasing. Gaps are accepted as-is, nothing is imputed.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(try_from = "Vec<Bar>", into = "Vec<Bar>")]
pub struct BarSeries {
    bars: Vec<Bar>,
}

impl BarSeries {
    /// Build a series, rejecting out-of-order dates, non-finite prices and
    /// bars whose open or close falls outside their high-low range.
    pub fn new(bars: Vec<Bar>) -> Result<Self, Error> {
        for (i, bar) in bars.iter().enumerate() {
            bar.check()
                .map_err(|reason| Error::InvalidInput(format!("bar {i} ({}): {reason}", bar.date)))?;
        }
        if let Some(pair) = bars.windows(2).find(|w| w[1].date <= w[0].date) {
            return Err(Error::InvalidInput(format!(
                "dates must be strictly increasing: {} followed by {}",
                pair[0].date, pair[1].date
            )));
        }
        Ok(Self { bars })
    }

    /// Number of bars
    pub fn len(&self) -> usize {
        self.bars.len()
    }

    /// Whether the series holds no bars
    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    /// All bars, oldest first
    pub fn bars(&self) -> &[Bar] {
        &self.bars
    }

    /// The most recent bar
    pub fn last(&self) -> Option<&Bar> {
        self.bars.last()
    }

    /// The most recent close
    pub fn last_close(&self) -> Option<f64> {
        self.bars.last().map(|b| b.close)
    }

    /// The most recent `n` bars (fewer when the series is shorter)
    pub fn tail(&self, n: usize) -> &[Bar] {
        &self.bars[self.bars.len().saturating_sub(n)..]
    }

    /// The series as it stood after its first `n` bars.
    pub fn truncated(&self, n: usize) -> Self {
        Self {
            bars: self.bars[..n.min(self.bars.len())].to_vec(),
        }
    }

    /// Keep only the most recent `n` bars.
    pub fn keep_last(&mut self, n: usize) {
        let drop = self.bars.len().saturating_sub(n);
        self.bars.drain(..drop);
    }

    pub fn highs(&self) -> Vec<f64> {
        self.bars.iter().map(|b| b.high).collect()
    }

    pub fn lows(&self) -> Vec<f64> {
        self.bars.iter().map(|b| b.low).collect()
    }

    pub fn closes(&self) -> Vec<f64> {
        self.bars.iter().map(|b| b.close).collect()
    }

    pub fn volumes(&self) -> Vec<f64> {
        self.bars.iter().map(|b| b.volume).collect()
    }
}

impl TryFrom<Vec<Bar>> for BarSeries {
    type Error = Error;

    fn try_from(bars: Vec<Bar>) -> Result<Self, Self::Error> {
        Self::new(bars)
    }
}

impl From<BarSeries> for Vec<Bar> {
    fn from(series: BarSeries) -> Self {
        series.bars
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Datelike;

    fn bar(day: u32, close: f64) -> Bar {
        Bar {
            date: NaiveDate::from_ymd_opt(2024, 1, day).unwrap(),
            open: close,
            high: close + 1.0,
            low: close - 1.0,
            close,
            volume: 1000.0,
        }
    }

    #[test]
    fn test_series_accepts_gaps() {
        let series = BarSeries::new(vec![bar(2, 10.0), bar(3, 11.0), bar(8, 12.0)]).unwrap();
        assert_eq!(series.len(), 3);
        assert_eq!(series.last_close(), Some(12.0));
    }

    #[test]
    fn test_series_rejects_unordered_dates() {
        let err = BarSeries::new(vec![bar(3, 10.0), bar(3, 11.0)]).unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[test]
    fn test_series_rejects_non_finite_price() {
        let mut bad = bar(2, 10.0);
        bad.close = f64::NAN;
        assert!(BarSeries::new(vec![bad]).is_err());
    }

    #[test]
    fn test_series_rejects_inverted_range() {
        let mut bad = bar(2, 10.0);
        bad.high = 9.0;
        bad.low = 11.0;
        let err = BarSeries::new(vec![bad]).unwrap_err();
        assert!(matches!(err, Error::InvalidInput(ref msg) if msg.contains("below low")));
    }

    #[test]
    fn test_series_rejects_close_outside_range() {
        let mut bad = bar(2, 10.0);
        bad.close = 11.5;
        assert!(matches!(BarSeries::new(vec![bad]), Err(Error::InvalidInput(_))));

        let mut bad_open = bar(3, 10.0);
        bad_open.open = 8.5;
        assert!(BarSeries::new(vec![bad_open]).is_err());

        // Touching the extremes is fine
        let mut edge = bar(4, 10.0);
        edge.open = edge.low;
        edge.close = edge.high;
        assert!(BarSeries::new(vec![edge]).is_ok());
    }

    #[test]
    fn test_zero_volume_is_legitimate() {
        let mut quiet = bar(2, 10.0);
        quiet.volume = 0.0;
        assert!(BarSeries::new(vec![quiet]).is_ok());
    }

    #[test]
    fn test_tail_and_truncated() {
        let series = BarSeries::new((1..=10).map(|d| bar(d, d as f64 + 10.0)).collect()).unwrap();
        assert_eq!(series.tail(3).len(), 3);
        assert_eq!(series.tail(30).len(), 10);
        let prefix = series.truncated(4);
        assert_eq!(prefix.len(), 4);
        assert_eq!(prefix.last_close(), Some(14.0));
    }

    #[test]
    fn test_keep_last() {
        let mut series = BarSeries::new((1..=10).map(|d| bar(d, 20.0)).collect()).unwrap();
        series.keep_last(4);
        assert_eq!(series.len(), 4);
        assert_eq!(series.bars()[0].date.day0(), 6);
    }

    #[test]
    fn test_close_location_zero_range() {
        let mut flat = bar(2, 10.0);
        flat.high = 10.0;
        flat.low = 10.0;
        assert_eq!(flat.close_location(), None);
        assert_eq!(flat.body_strength(), None);
        assert_eq!(bar(2, 10.0).close_location(), Some(0.5));
    }

    #[test]
    fn test_series_deserialize_validates() {
        let json = r#"[
            {"date":"2024-01-03","open":1.0,"high":1.0,"low":1.0,"close":1.0,"volume":1.0},
            {"date":"2024-01-02","open":1.0,"high":1.0,"low":1.0,"close":1.0,"volume":1.0}
        ]"#;
        assert!(serde_json::from_str::<BarSeries>(json).is_err());
    }
}
