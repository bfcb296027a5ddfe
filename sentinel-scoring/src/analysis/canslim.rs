//! Fundamental momentum (CANSLIM-style) scorer.
//!
//! Six independently thresholded components summed and clamped to 0-100:
//!
//! | Component        | Points  | Source                              |
//! |------------------|---------|-------------------------------------|
//! | C Earnings       | 0-25    | statements, else growth snapshot    |
//! | A Sales          | 0-20    | statements, else growth snapshot    |
//! | N New high       | 0-20    | bars                                |
//! | S Supply/demand  | -5-20   | bars                                |
//! | L Leadership     | 0-15    | relative strength approximation     |
//! | I Institutional  | 0-10    | ownership snapshot, else fixed 0    |
//!
//! Growth figures from the snapshot are the thinner source and score at
//! most 20 (earnings) and 15 (sales).

use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::trace;

use super::rs::{rs_percent_approx, RsRanker};
use super::{
    breakdown_map, finite, metrics_map, require_history, Analysis, EmptyResult, ScoreResult,
    Scored, ScoringError, ScoringResult,
};
use crate::data::{BarSeries, FundamentalData, IncomeStatement};
use crate::indicators::{self, round_to};

/// Minimum bars for a CANSLIM score.
pub const CANSLIM_MIN_BARS: usize = 100;

const SNAPSHOT_EARNINGS_CAP: i32 = 20;
const SNAPSHOT_SALES_CAP: i32 = 15;
const SURGE_MULTIPLE: f64 = 1.2;

// ============================================================================
// Result Types
// ============================================================================

/// Letter grade from the total score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Grade {
    #[serde(rename = "A+")]
    APlus,
    #[serde(rename = "A")]
    A,
    #[serde(rename = "B+")]
    BPlus,
    #[serde(rename = "B")]
    B,
    #[serde(rename = "C")]
    C,
    #[serde(rename = "D")]
    D,
}

impl Grade {
    pub fn from_score(score: i32) -> Self {
        match score {
            s if s >= 80 => Self::APlus,
            s if s >= 70 => Self::A,
            s if s >= 60 => Self::BPlus,
            s if s >= 50 => Self::B,
            s if s >= 35 => Self::C,
            _ => Self::D,
        }
    }

    pub const ALL: [Grade; 6] = [
        Self::APlus,
        Self::A,
        Self::BPlus,
        Self::B,
        Self::C,
        Self::D,
    ];
}

impl fmt::Display for Grade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::APlus => "A+",
            Self::A => "A",
            Self::BPlus => "B+",
            Self::B => "B",
            Self::C => "C",
            Self::D => "D",
        })
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanslimBreakdown {
    #[serde(rename = "C_earnings")]
    pub earnings: i32,
    #[serde(rename = "A_sales")]
    pub sales: i32,
    #[serde(rename = "N_new_high")]
    pub new_high: i32,
    #[serde(rename = "S_volume")]
    pub supply_demand: i32,
    #[serde(rename = "L_rs_leader")]
    pub leadership: i32,
    #[serde(rename = "I_inst")]
    pub institutional: i32,
}

impl CanslimBreakdown {
    pub fn total(&self) -> i32 {
        self.earnings
            + self.sales
            + self.new_high
            + self.supply_demand
            + self.leadership
            + self.institutional
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CanslimMetrics {
    /// YoY EPS growth, percent
    pub eps_growth: Option<f64>,
    /// YoY revenue growth, percent
    pub rev_growth: Option<f64>,
    /// Distance below the 52-week closing high, percent (1 dp)
    pub dist_from_high_pct: Option<f64>,
    /// Surge-up days minus surge-down days over the last 20 bars
    pub net_demand_days: i32,
    /// Relative strength approximation, 0-100
    pub rs_pct: i32,
    /// Institutional ownership, percent
    pub institutional_pct: Option<f64>,
}

/// CANSLIM output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanslimScore {
    pub ticker: String,
    /// Total, 0-100
    pub score: i32,
    pub grade: Grade,
    pub breakdown: CanslimBreakdown,
    pub metrics: CanslimMetrics,
}

impl CanslimScore {
    /// Defined empty result for a ticker.
    pub fn empty_for(ticker: &str) -> Self {
        Self {
            ticker: ticker.to_string(),
            ..Self::empty()
        }
    }
}

impl EmptyResult for CanslimScore {
    fn empty() -> Self {
        Self {
            ticker: String::new(),
            score: 0,
            grade: Grade::D,
            breakdown: CanslimBreakdown::default(),
            metrics: CanslimMetrics::default(),
        }
    }
}

impl Scored for CanslimScore {
    const MAX_SCORE: i32 = 100;

    fn score(&self) -> i32 {
        self.score
    }

    fn score_result(&self) -> ScoreResult {
        let b = &self.breakdown;
        let m = &self.metrics;
        let mut metrics = metrics_map([
            ("net_demand_days", f64::from(m.net_demand_days)),
            ("rs_pct", f64::from(m.rs_pct)),
        ]);
        let optional = [
            ("eps_growth", m.eps_growth),
            ("rev_growth", m.rev_growth),
            ("dist_from_high_pct", m.dist_from_high_pct),
            ("institutional_pct", m.institutional_pct),
        ];
        for (name, value) in optional {
            if let Some(v) = value {
                metrics.insert(name.to_string(), v);
            }
        }

        ScoreResult {
            score: self.score,
            breakdown: breakdown_map([
                ("C_earnings", b.earnings),
                ("A_sales", b.sales),
                ("N_new_high", b.new_high),
                ("S_volume", b.supply_demand),
                ("L_rs_leader", b.leadership),
                ("I_inst", b.institutional),
            ]),
            metrics,
        }
    }
}

// ============================================================================
// Threshold Ladders
// ============================================================================

pub fn earnings_points(growth_pct: f64) -> i32 {
    match growth_pct {
        g if g >= 50.0 => 25,
        g if g >= 30.0 => 20,
        g if g >= 20.0 => 15,
        g if g >= 10.0 => 10,
        g if g >= 0.0 => 5,
        _ => 0,
    }
}

pub fn sales_points(growth_pct: f64) -> i32 {
    match growth_pct {
        g if g >= 30.0 => 20,
        g if g >= 20.0 => 15,
        g if g >= 10.0 => 10,
        g if g >= 5.0 => 5,
        _ => 0,
    }
}

/// Points from the fractional distance below the 52-week high.
pub fn new_high_points(distance: f64) -> i32 {
    match distance {
        d if d <= 0.03 => 20,
        d if d <= 0.07 => 15,
        d if d <= 0.12 => 10,
        d if d <= 0.20 => 5,
        _ => 0,
    }
}

pub fn supply_demand_points(net_days: i32) -> i32 {
    match net_days {
        n if n >= 4 => 20,
        n if n >= 2 => 15,
        n if n >= 0 => 10,
        n if n >= -1 => 0,
        _ => -5,
    }
}

pub fn leadership_points(rs_pct: i32) -> i32 {
    match rs_pct {
        p if p >= 90 => 15,
        p if p >= 80 => 10,
        p if p >= 70 => 5,
        _ => 0,
    }
}

pub fn institutional_points(pct: f64) -> i32 {
    match pct {
        p if p >= 70.0 => 10,
        p if p >= 50.0 => 7,
        p if p >= 30.0 => 4,
        _ => 0,
    }
}

/// YoY growth in percent between the two most recent values.
///
/// `None` when either value is missing or the prior one is not positive.
fn yoy_growth(current: Option<f64>, prior: Option<f64>) -> Option<f64> {
    match (current, prior) {
        (Some(curr), Some(prev)) if prev > 0.0 => Some((curr - prev) / prev * 100.0),
        _ => None,
    }
}

/// Growth and points for one fundamental component.
///
/// Statements win when at least two periods exist; otherwise the snapshot
/// figure scores, capped.
fn growth_component(
    statements: &[IncomeStatement],
    from_statement: impl Fn(&IncomeStatement) -> Option<f64>,
    snapshot: Option<f64>,
    ladder: fn(f64) -> i32,
    snapshot_cap: i32,
) -> (Option<f64>, i32) {
    if statements.len() >= 2 {
        let growth = yoy_growth(from_statement(&statements[0]), from_statement(&statements[1]));
        return (growth, growth.map_or(0, ladder));
    }
    match snapshot.filter(|g| g.is_finite()) {
        Some(g) => (Some(g), ladder(g).min(snapshot_cap)),
        None => (None, 0),
    }
}

// ============================================================================
// Analyzer
// ============================================================================

pub struct CanslimAnalyzer;

impl CanslimAnalyzer {
    /// Score a ticker. Absent fundamentals contribute zero points.
    pub fn analyze(
        ticker: &str,
        bars: &BarSeries,
        fundamentals: Option<&FundamentalData>,
    ) -> Analysis<CanslimScore> {
        Self::compute(ticker, bars, fundamentals).into()
    }

    fn compute(
        ticker: &str,
        bars: &BarSeries,
        fundamentals: Option<&FundamentalData>,
    ) -> ScoringResult<CanslimScore> {
        require_history(bars.len(), CANSLIM_MIN_BARS)?;

        let closes = bars.closes();
        let volumes = bars.volumes();
        let len = closes.len();
        let price = closes[len - 1];

        let statements: &[IncomeStatement] = fundamentals
            .map(|f| f.statements.as_slice())
            .unwrap_or_default();
        let snapshot = fundamentals.and_then(|f| f.snapshot.as_ref());

        // C and A
        let (eps_growth, earnings) = growth_component(
            statements,
            IncomeStatement::earnings_per_share,
            snapshot.and_then(|s| s.earnings_growth_yoy),
            earnings_points,
            SNAPSHOT_EARNINGS_CAP,
        );
        let (rev_growth, sales) = growth_component(
            statements,
            |s| s.revenue,
            snapshot.and_then(|s| s.revenue_growth_yoy),
            sales_points,
            SNAPSHOT_SALES_CAP,
        );

        // N
        let high_52w = indicators::highest(indicators::tail(&closes, 252))
            .ok_or_else(|| ScoringError::fault("empty close window"))?;
        let distance = finite((high_52w - price) / high_52w, "distance from high")?;
        let new_high = new_high_points(distance);

        // S
        let baseline = if len >= 50 {
            indicators::mean(&volumes[len - 50..len - 20])
        } else {
            indicators::mean(indicators::tail(&volumes, 20))
        }
        .unwrap_or(0.0);
        let mut net_demand_days = 0;
        for i in len - 20..len {
            if volumes[i] <= baseline * SURGE_MULTIPLE {
                continue;
            }
            let change = closes[i] / closes[i - 1] - 1.0;
            if change > 0.0 {
                net_demand_days += 1;
            } else if change < 0.0 {
                net_demand_days -= 1;
            }
        }
        let supply_demand = supply_demand_points(net_demand_days);

        // L
        let raw_rs = RsRanker::raw_score_closes(&closes).ok();
        let rs_pct = rs_percent_approx(raw_rs);
        let leadership = leadership_points(rs_pct);

        // I
        let institutional_pct = fundamentals
            .and_then(|f| f.ownership.as_ref())
            .and_then(|o| o.institutional_pct)
            .filter(|p| p.is_finite());
        let institutional = institutional_pct.map_or(0, institutional_points);

        let breakdown = CanslimBreakdown {
            earnings,
            sales,
            new_high,
            supply_demand,
            leadership,
            institutional,
        };
        let score = breakdown.total().clamp(0, 100);

        trace!(ticker, score, net_demand_days, rs_pct, "CANSLIM computed");

        Ok(CanslimScore {
            ticker: ticker.to_string(),
            score,
            grade: Grade::from_score(score),
            breakdown,
            metrics: CanslimMetrics {
                eps_growth,
                rev_growth,
                dist_from_high_pct: Some(round_to(distance * 100.0, 1)),
                net_demand_days,
                rs_pct,
                institutional_pct,
            },
        })
    }
}
