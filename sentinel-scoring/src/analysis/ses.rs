//! Efficiency score (SES).
//!
//! Measures how cleanly a security is being accumulated:
//!
//! | Component           | Points | Measure                                  |
//! |---------------------|--------|------------------------------------------|
//! | Fractal efficiency  | 0-30   | Kaufman efficiency ratio                 |
//! | True force          | 0-30   | share of volume x change on up bars      |
//! | Volatility squeeze  | -5-20  | recent / prior return standard deviation |
//! | Bar quality         | 0-20   | close location and body strength         |

use serde::{Deserialize, Serialize};
use tracing::trace;

use super::{
    breakdown_map, finite, metrics_map, require_history, Analysis, EmptyResult, ScoreResult,
    Scored, ScoringError, ScoringResult,
};
use crate::data::BarSeries;
use crate::indicators::{self, round_to};

/// Default lookback.
pub const SES_DEFAULT_PERIOD: usize = 20;

/// Bars required beyond the period for the squeeze baseline.
const BASELINE_BARS: usize = 40;

/// Returns window that bounds the squeeze baseline. Shorter series have no
/// baseline and a contraction ratio of 1.0.
const SQUEEZE_LOOKBACK: usize = 60;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SesBreakdown {
    pub fractal_efficiency: i32,
    pub true_force: i32,
    pub volatility_squeeze: i32,
    pub bar_quality: i32,
}

impl SesBreakdown {
    pub fn total(&self) -> i32 {
        self.fractal_efficiency + self.true_force + self.volatility_squeeze + self.bar_quality
    }
}

/// Raw diagnostics, rounded to 3 dp.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SesMetrics {
    pub er: f64,
    pub force_ratio: f64,
    pub vol_contraction: f64,
    pub avg_clv: f64,
}

impl Default for SesMetrics {
    fn default() -> Self {
        Self {
            er: 0.0,
            force_ratio: 0.5,
            vol_contraction: 1.0,
            avg_clv: 0.5,
        }
    }
}

/// SES output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SesScore {
    /// Total, 0-100
    pub score: i32,
    pub metrics: SesMetrics,
    pub breakdown: SesBreakdown,
}

impl EmptyResult for SesScore {
    fn empty() -> Self {
        Self {
            score: 0,
            metrics: SesMetrics::default(),
            breakdown: SesBreakdown::default(),
        }
    }
}

impl Scored for SesScore {
    const MAX_SCORE: i32 = 100;

    fn score(&self) -> i32 {
        self.score
    }

    fn score_result(&self) -> ScoreResult {
        let b = &self.breakdown;
        let m = &self.metrics;
        ScoreResult {
            score: self.score,
            breakdown: breakdown_map([
                ("fractal_efficiency", b.fractal_efficiency),
                ("true_force", b.true_force),
                ("volatility_squeeze", b.volatility_squeeze),
                ("bar_quality", b.bar_quality),
            ]),
            metrics: metrics_map([
                ("er", m.er),
                ("force_ratio", m.force_ratio),
                ("vol_contraction", m.vol_contraction),
                ("avg_clv", m.avg_clv),
            ]),
        }
    }
}

// ============================================================================
// Threshold Ladders
// ============================================================================

pub fn efficiency_points(er: f64) -> i32 {
    match er {
        e if e > 0.60 => 30,
        e if e > 0.50 => 25,
        e if e > 0.40 => 20,
        e if e > 0.30 => 10,
        _ => 0,
    }
}

pub fn force_points(ratio: f64) -> i32 {
    match ratio {
        r if r > 0.80 => 30,
        r if r > 0.65 => 20,
        r if r > 0.55 => 10,
        _ => 0,
    }
}

pub fn squeeze_points(contraction: f64) -> i32 {
    match contraction {
        c if c < 0.50 => 20,
        c if c < 0.65 => 15,
        c if c < 0.80 => 10,
        c if c > 1.20 => -5,
        _ => 0,
    }
}

pub fn bar_quality_points(avg_clv: f64, avg_body: f64) -> i32 {
    if avg_clv > 0.60 && avg_body > 0.10 {
        20
    } else if avg_clv > 0.55 && avg_body > 0.0 {
        15
    } else if avg_clv > 0.50 {
        10
    } else {
        0
    }
}

// ============================================================================
// Analyzer
// ============================================================================

pub struct SesAnalyzer;

impl SesAnalyzer {
    pub fn analyze(bars: &BarSeries) -> Analysis<SesScore> {
        Self::analyze_with_period(bars, SES_DEFAULT_PERIOD)
    }

    pub fn analyze_with_period(bars: &BarSeries, period: usize) -> Analysis<SesScore> {
        Self::compute(bars, period).into()
    }

    fn compute(bars: &BarSeries, period: usize) -> ScoringResult<SesScore> {
        if period < 2 {
            return Err(ScoringError::fault("period must be at least 2"));
        }
        require_history(bars.len(), period.saturating_add(BASELINE_BARS))?;

        let closes = bars.closes();
        let volumes = bars.volumes();
        let len = closes.len();

        // diffs[k] and returns[k] describe the move into bar k + 1
        let diffs = indicators::diffs(&closes);
        let returns = indicators::pct_changes(&closes);
        let recent_moves = indicators::tail(&diffs, period);

        // Fractal efficiency
        let net_change = (closes[len - 1] - closes[len - period]).abs();
        let path: f64 = recent_moves.iter().map(|d| d.abs()).sum();
        let er = if path > 0.0 {
            finite(net_change / path, "efficiency ratio")?
        } else {
            0.0
        };

        // True force
        let (mut up_force, mut down_force) = (0.0, 0.0);
        for bar in len - period..len {
            let force = volumes[bar] * diffs[bar - 1];
            if force > 0.0 {
                up_force += force;
            } else if force < 0.0 {
                down_force -= force;
            }
        }
        let total_force = up_force + down_force;
        let force_ratio = if total_force > 0.0 {
            finite(up_force / total_force, "force ratio")?
        } else {
            0.5
        };

        // Volatility squeeze: bars [len - 60, len - period), skipping bar 0
        // which has no return.
        let recent_vol = indicators::std_dev(indicators::tail(&returns, period));
        let baseline_start = len.saturating_sub(SQUEEZE_LOOKBACK).max(1);
        let baseline_end = len.saturating_sub(period);
        let baseline_vol = if len >= SQUEEZE_LOOKBACK && baseline_start < baseline_end {
            indicators::std_dev(&returns[baseline_start - 1..baseline_end - 1])
        } else {
            None
        };
        let vol_contraction = match (recent_vol, baseline_vol) {
            (Some(curr), Some(past)) if past > 0.0 => finite(curr / past, "volatility ratio")?,
            _ => 1.0,
        };

        // Bar quality
        let recent_bars = bars.tail(period);
        let avg_clv = recent_bars
            .iter()
            .map(|b| b.close_location().unwrap_or(0.5))
            .sum::<f64>()
            / period as f64;
        let avg_body = recent_bars
            .iter()
            .map(|b| b.body_strength().unwrap_or(0.0))
            .sum::<f64>()
            / period as f64;

        let breakdown = SesBreakdown {
            fractal_efficiency: efficiency_points(er),
            true_force: force_points(force_ratio),
            volatility_squeeze: squeeze_points(vol_contraction),
            bar_quality: bar_quality_points(avg_clv, avg_body),
        };
        let score = breakdown.total().clamp(0, 100);

        trace!(score, er, force_ratio, vol_contraction, avg_clv, "SES computed");

        Ok(SesScore {
            score,
            metrics: SesMetrics {
                er: round_to(er, 3),
                force_ratio: round_to(force_ratio, 3),
                vol_contraction: round_to(vol_contraction, 3),
                avg_clv: round_to(avg_clv, 3),
            },
            breakdown,
        })
    }
}
