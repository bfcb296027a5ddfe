//! Volatility contraction (VCP) analyzer.
//!
//! Scores a tightening base: shrinking price ranges, volume dry-up,
//! moving-average alignment and proximity to the 50-bar pivot.
//!
//! | Component | Points |
//! |-----------|--------|
//! | Tightness | 0-40   |
//! | Volume    | 0-30   |
//! | Trend     | 0-30   |
//! | Pivot     | 0-5    |

use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::trace;

use super::{
    breakdown_map, finite, metrics_map, require_history, Analysis, EmptyResult, ScoreResult,
    Scored, ScoringError, ScoringResult,
};
use crate::data::BarSeries;
use crate::indicators::{self, ATR_PERIOD};

/// Minimum bars for a VCP score.
pub const VCP_MIN_BARS: usize = 130;

/// Upper bound of the VCP scale.
pub const VCP_MAX_SCORE: i32 = 105;

const RANGE_WINDOWS: [usize; 4] = [20, 30, 40, 60];

// ============================================================================
// Result Types
// ============================================================================

/// Qualitative tags emitted alongside the score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VcpSignal {
    #[serde(rename = "Tight Base (VCP)")]
    TightBase,
    #[serde(rename = "V-Contraction Detected")]
    Contraction,
    #[serde(rename = "Volume Dry-up Detected")]
    VolumeDryUp,
    #[serde(rename = "Trend Alignment OK")]
    TrendAlignment,
    #[serde(rename = "Near Pivot Point")]
    NearPivot,
}

impl fmt::Display for VcpSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self {
            Self::TightBase => "Tight Base (VCP)",
            Self::Contraction => "V-Contraction Detected",
            Self::VolumeDryUp => "Volume Dry-up Detected",
            Self::TrendAlignment => "Trend Alignment OK",
            Self::NearPivot => "Near Pivot Point",
        };
        f.write_str(tag)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VcpBreakdown {
    pub tight: i32,
    pub vol: i32,
    pub ma: i32,
    pub pivot: i32,
}

impl VcpBreakdown {
    pub fn total(&self) -> i32 {
        self.tight + self.vol + self.ma + self.pivot
    }
}

/// VCP output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VcpScore {
    /// Total, 0-105
    pub score: i32,
    /// 14-bar ATR at the last bar, used for stop sizing
    pub atr: f64,
    pub signals: Vec<VcpSignal>,
    pub is_dryup: bool,
    pub is_contracting: bool,
    /// 20-bar range ratio (4 dp)
    pub range_pct: f64,
    /// Recent / baseline volume (2 dp)
    pub vol_ratio: f64,
    pub breakdown: VcpBreakdown,
}

impl EmptyResult for VcpScore {
    fn empty() -> Self {
        Self {
            score: 0,
            atr: 0.0,
            signals: Vec::new(),
            is_dryup: false,
            is_contracting: false,
            range_pct: 0.0,
            vol_ratio: 1.0,
            breakdown: VcpBreakdown::default(),
        }
    }
}

impl Scored for VcpScore {
    const MAX_SCORE: i32 = VCP_MAX_SCORE;

    fn score(&self) -> i32 {
        self.score
    }

    fn score_result(&self) -> ScoreResult {
        ScoreResult {
            score: self.score,
            breakdown: breakdown_map([
                ("tight", self.breakdown.tight),
                ("vol", self.breakdown.vol),
                ("ma", self.breakdown.ma),
                ("pivot", self.breakdown.pivot),
            ]),
            metrics: metrics_map([
                ("atr", self.atr),
                ("range_pct", self.range_pct),
                ("vol_ratio", self.vol_ratio),
            ]),
        }
    }
}

// ============================================================================
// Threshold Ladders
// ============================================================================

/// Tightness points from the mean 20/30/40-bar range ratio.
pub fn tightness_points(avg_range: f64, contracting: bool) -> i32 {
    let base = if avg_range < 0.10 {
        40
    } else if avg_range < 0.15 {
        30
    } else if avg_range < 0.20 {
        20
    } else if avg_range < 0.28 {
        10
    } else {
        0
    };
    let bonus = if contracting { 5 } else { 0 };
    (base + bonus).min(40)
}

/// Volume dry-up points from recent / baseline volume.
pub fn volume_points(ratio: f64) -> i32 {
    if ratio < 0.45 {
        30
    } else if ratio < 0.60 {
        25
    } else if ratio < 0.75 {
        15
    } else {
        0
    }
}

/// Pivot bonus from the fractional distance below the 50-bar high.
pub fn pivot_points(distance: f64) -> i32 {
    if (0.0..=0.04).contains(&distance) {
        5
    } else if distance > 0.04 && distance <= 0.08 {
        3
    } else {
        0
    }
}

// ============================================================================
// Analyzer
// ============================================================================

pub struct VcpAnalyzer;

impl VcpAnalyzer {
    pub fn analyze(bars: &BarSeries) -> Analysis<VcpScore> {
        Self::compute(bars).into()
    }

    fn compute(bars: &BarSeries) -> ScoringResult<VcpScore> {
        require_history(bars.len(), VCP_MIN_BARS)?;

        let highs = bars.highs();
        let lows = bars.lows();
        let closes = bars.closes();
        let volumes = bars.volumes();
        let len = bars.len();

        let atr = indicators::atr(bars.bars(), ATR_PERIOD)
            .ok_or_else(|| ScoringError::fault("ATR unavailable"))?;

        let mut ranges = [0.0; 4];
        for (slot, window) in ranges.iter_mut().zip(RANGE_WINDOWS) {
            let high = indicators::highest(indicators::tail(&highs, window))
                .ok_or_else(|| ScoringError::fault("empty range window"))?;
            let low = indicators::lowest(indicators::tail(&lows, window))
                .ok_or_else(|| ScoringError::fault("empty range window"))?;
            *slot = finite((high - low) / high, "range ratio")?;
        }

        let avg_range = (ranges[0] + ranges[1] + ranges[2]) / 3.0;
        let is_contracting = ranges[0] < ranges[1] && ranges[1] < ranges[2];
        let tight = tightness_points(avg_range, is_contracting);

        let recent_volume = indicators::mean(indicators::tail(&volumes, 20)).unwrap_or(0.0);
        let baseline_volume = indicators::mean(&volumes[len - 60..len - 40]).unwrap_or(0.0);
        let vol_ratio = if baseline_volume > 0.0 {
            recent_volume / baseline_volume
        } else {
            1.0
        };
        let vol = volume_points(vol_ratio);

        let price = *closes
            .last()
            .ok_or_else(|| ScoringError::fault("empty series"))?;
        let ma50 = indicators::sma(&closes, 50);
        let ma150 = indicators::sma(&closes, 150);
        let ma200 = indicators::sma(&closes, 200);
        let above = |a: Option<f64>, b: Option<f64>| match (a, b) {
            (Some(a), Some(b)) if a > b => 10,
            _ => 0,
        };
        let ma = above(Some(price), ma50) + above(ma50, ma150) + above(ma150, ma200);

        let pivot_high = indicators::highest(indicators::tail(&highs, 50))
            .ok_or_else(|| ScoringError::fault("empty pivot window"))?;
        let distance = finite((pivot_high - price) / pivot_high, "pivot distance")?;
        let pivot = pivot_points(distance);

        let is_dryup = vol_ratio < 0.75;
        let mut signals = Vec::new();
        if tight >= 35 {
            signals.push(VcpSignal::TightBase);
        }
        if is_contracting {
            signals.push(VcpSignal::Contraction);
        }
        if is_dryup {
            signals.push(VcpSignal::VolumeDryUp);
        }
        if ma >= 20 {
            signals.push(VcpSignal::TrendAlignment);
        }
        if pivot > 0 {
            signals.push(VcpSignal::NearPivot);
        }

        let breakdown = VcpBreakdown {
            tight,
            vol,
            ma,
            pivot,
        };
        let score = breakdown.total().clamp(0, VCP_MAX_SCORE);

        trace!(score, avg_range, vol_ratio, distance, "VCP computed");

        Ok(VcpScore {
            score,
            atr,
            signals,
            is_dryup,
            is_contracting,
            range_pct: indicators::round_to(ranges[0], 4),
            vol_ratio: indicators::round_to(vol_ratio, 2),
            breakdown,
        })
    }
}
