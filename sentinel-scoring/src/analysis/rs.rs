//! Relative strength.
//!
//! Two stages with a hard barrier between them:
//!
//! 1. **Raw score** per security: a weighted blend of trailing returns.
//! 2. **Percentile rating** over the whole scanned batch. A rating only
//!    means something relative to the other members of the same scan, so
//!    it cannot be produced per ticker.
//!
//! [`rs_percent_approx`] and [`rs_rating_approx`] are cheap per-ticker
//! rescalings of the raw score for places where the batch rating is not
//! available (the fundamental scorer, the phase engine, walk-forward
//! studies). They are intentionally not the batch percentile.

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{finite, require_history, Analysis, ScoringError, ScoringResult};
use crate::data::BarSeries;

/// Sentinel for an unratable series in flat exports.
pub const INVALID_RAW_RS: f64 = -999.0;

/// Minimum bars for a raw score.
pub const RS_MIN_BARS: usize = 21;

/// (lookback bars, weight)
const RS_BLEND: [(usize, f64); 4] = [(252, 0.4), (126, 0.2), (63, 0.2), (21, 0.2)];

/// Phase A output, scoped to one scan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawRsRecord {
    pub ticker: String,
    pub raw_rs: f64,
}

impl RawRsRecord {
    pub fn new(ticker: impl Into<String>, raw_rs: f64) -> Self {
        Self {
            ticker: ticker.into(),
            raw_rs,
        }
    }

    /// Whether this record can take part in the percentile stage.
    pub fn is_valid(&self) -> bool {
        self.raw_rs.is_finite() && self.raw_rs != INVALID_RAW_RS
    }
}

/// Phase B output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PercentileRecord {
    pub ticker: String,
    pub raw_rs: f64,
    /// 1-99
    pub rs_rating: u8,
}

pub struct RsRanker;

impl RsRanker {
    /// Raw momentum blend: 40% of the 252-bar return plus 20% each of the
    /// 126, 63 and 21-bar returns.
    pub fn raw_score(bars: &BarSeries) -> Analysis<f64> {
        Self::raw_score_closes(&bars.closes()).into()
    }

    /// Raw score over closes, oldest first.
    ///
    /// A lookback longer than the series uses the full history instead.
    pub fn raw_score_closes(closes: &[f64]) -> ScoringResult<f64> {
        require_history(closes.len(), RS_MIN_BARS)?;

        let last = closes[closes.len() - 1];
        let trailing_return = |n: usize| {
            let base = if closes.len() >= n {
                closes[closes.len() - n]
            } else {
                closes[0]
            };
            last / base - 1.0
        };

        let raw = RS_BLEND
            .iter()
            .map(|&(n, weight)| trailing_return(n) * weight)
            .sum::<f64>();

        finite(raw, "raw relative strength").map_err(|_| ScoringError::InvalidRawScore)
    }

    /// The raw score, or [`INVALID_RAW_RS`] when the series is unratable.
    pub fn raw_or_invalid(bars: &BarSeries) -> f64 {
        Self::raw_score(bars)
            .value()
            .copied()
            .unwrap_or(INVALID_RAW_RS)
    }

    /// Assign 1-99 ratings over a complete batch.
    ///
    /// Invalid records are dropped. The rest are sorted ascending by raw
    /// score (stable, so ties keep their input order) and the record at
    /// position `i` of `n` gets `floor((i + 1) / n * 99) + 1`, capped at 99.
    /// An empty batch gives an empty result.
    pub fn assign_percentiles(records: Vec<RawRsRecord>) -> Vec<PercentileRecord> {
        let input = records.len();
        let mut valid: Vec<RawRsRecord> = records.into_iter().filter(RawRsRecord::is_valid).collect();
        if valid.is_empty() {
            return Vec::new();
        }

        valid.sort_by(|a, b| a.raw_rs.total_cmp(&b.raw_rs));

        let total = valid.len() as f64;
        let rated: Vec<PercentileRecord> = valid
            .into_iter()
            .enumerate()
            .map(|(i, record)| {
                let rating = (((i + 1) as f64 / total) * 99.0).floor() as u32 + 1;
                PercentileRecord {
                    ticker: record.ticker,
                    raw_rs: record.raw_rs,
                    rs_rating: rating.min(99) as u8,
                }
            })
            .collect();

        debug!(input, rated = rated.len(), "RS percentiles assigned");
        rated
    }
}

/// Raw score rescaled to 0-100: `clamp(trunc((raw + 0.3) * 100), 0, 100)`.
///
/// 0 for a missing or invalid raw score.
pub fn rs_percent_approx(raw: Option<f64>) -> i32 {
    match raw {
        Some(r) if r.is_finite() && r != INVALID_RAW_RS => {
            ((r + 0.3) * 100.0).clamp(0.0, 100.0).trunc() as i32
        }
        _ => 0,
    }
}

/// Raw score mapped onto the 1-99 rating scale: `clamp(trunc((raw + 1) * 50), 1, 99)`.
///
/// Stand-in for the batch rating when no batch exists.
pub fn rs_rating_approx(raw: f64) -> u8 {
    ((raw + 1.0) * 50.0).clamp(1.0, 99.0).trunc() as u8
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{series_from_closes, trending_series};
    use proptest::prelude::*;

    #[test]
    fn test_raw_score_requires_21_bars() {
        let result = RsRanker::raw_score(&trending_series(20, 10.0, 0.1));
        assert!(matches!(
            result.reason(),
            Some(ScoringError::InsufficientHistory { required: 21, .. })
        ));
        assert_eq!(
            RsRanker::raw_or_invalid(&trending_series(20, 10.0, 0.1)),
            INVALID_RAW_RS
        );
    }

    #[test]
    fn test_raw_score_short_history_uses_full_series() {
        // 21 bars from 10 to 12: every lookback falls back to the first close
        let closes: Vec<f64> = (0..21).map(|i| 10.0 + 0.1 * i as f64).collect();
        let raw = RsRanker::raw_score_closes(&closes).unwrap();
        assert!((raw - 0.2).abs() < 1e-12);
    }

    #[test]
    fn test_raw_score_blend_weights() {
        // 300 bars: flat at 100, last 21 bars at 110 except the final close at 121
        let mut closes = vec![100.0; 300];
        for c in closes.iter_mut().skip(280) {
            *c = 110.0;
        }
        closes[299] = 121.0;
        // r252 = r126 = r63 = 0.21 (bases at 100); r21 base is closes[279] = 100
        let raw = RsRanker::raw_score(&series_from_closes(&closes));
        assert!((raw.value().copied().unwrap() - 0.21).abs() < 1e-12);
    }

    #[test]
    fn test_assign_percentiles_empty_batch() {
        assert!(RsRanker::assign_percentiles(Vec::new()).is_empty());
        assert!(RsRanker::assign_percentiles(vec![RawRsRecord::new("X", INVALID_RAW_RS)]).is_empty());
    }

    #[test]
    fn test_assign_percentiles_known_values() {
        let rated = RsRanker::assign_percentiles(vec![
            RawRsRecord::new("C", 0.5),
            RawRsRecord::new("A", -0.2),
            RawRsRecord::new("B", 0.1),
            RawRsRecord::new("D", 0.9),
        ]);
        let pairs: Vec<(&str, u8)> = rated.iter().map(|r| (r.ticker.as_str(), r.rs_rating)).collect();
        // floor(i/4 * 99) + 1 for i = 1..4, top capped at 99
        assert_eq!(pairs, vec![("A", 25), ("B", 50), ("C", 75), ("D", 99)]);
    }

    #[test]
    fn test_assign_percentiles_single_member() {
        let rated = RsRanker::assign_percentiles(vec![RawRsRecord::new("ONLY", 0.3)]);
        assert_eq!(rated[0].rs_rating, 99);
    }

    #[test]
    fn test_ties_keep_insertion_order() {
        let rated = RsRanker::assign_percentiles(vec![
            RawRsRecord::new("FIRST", 0.1),
            RawRsRecord::new("SECOND", 0.1),
            RawRsRecord::new("LOW", -0.1),
        ]);
        let order: Vec<&str> = rated.iter().map(|r| r.ticker.as_str()).collect();
        assert_eq!(order, vec!["LOW", "FIRST", "SECOND"]);
    }

    #[test]
    fn test_percent_approx() {
        assert_eq!(rs_percent_approx(Some(0.5)), 80);
        assert_eq!(rs_percent_approx(Some(-0.5)), 0);
        assert_eq!(rs_percent_approx(Some(2.0)), 100);
        assert_eq!(rs_percent_approx(Some(INVALID_RAW_RS)), 0);
        assert_eq!(rs_percent_approx(None), 0);
    }

    #[test]
    fn test_rating_approx() {
        assert_eq!(rs_rating_approx(0.0), 50);
        assert_eq!(rs_rating_approx(0.5), 75);
        assert_eq!(rs_rating_approx(-3.0), 1);
        assert_eq!(rs_rating_approx(5.0), 99);
    }

    proptest! {
        #[test]
        fn prop_ratings_in_range_and_monotone(raws in prop::collection::vec(-1.0f64..3.0, 1..300)) {
            let records: Vec<RawRsRecord> = raws
                .iter()
                .enumerate()
                .map(|(i, &r)| RawRsRecord::new(format!("T{i}"), r))
                .collect();
            let rated = RsRanker::assign_percentiles(records.clone());

            prop_assert_eq!(rated.len(), raws.len());
            for pair in rated.windows(2) {
                prop_assert!(pair[0].raw_rs <= pair[1].raw_rs);
                prop_assert!(pair[0].rs_rating <= pair[1].rs_rating);
            }
            for r in &rated {
                prop_assert!((1..=99).contains(&r.rs_rating));
            }

            let again = RsRanker::assign_percentiles(records);
            prop_assert_eq!(rated, again);
        }

        #[test]
        fn prop_invalid_records_are_excluded(valid in prop::collection::vec(-1.0f64..1.0, 0..50), invalid in 0usize..10) {
            let mut records: Vec<RawRsRecord> = valid
                .iter()
                .enumerate()
                .map(|(i, &r)| RawRsRecord::new(format!("V{i}"), r))
                .collect();
            records.extend((0..invalid).map(|i| RawRsRecord::new(format!("X{i}"), INVALID_RAW_RS)));

            let rated = RsRanker::assign_percentiles(records);
            prop_assert_eq!(rated.len(), valid.len());
            prop_assert!(rated.iter().all(|r| r.ticker.starts_with('V')));
        }
    }
}
