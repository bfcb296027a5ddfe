//! ECR phase classification.
//!
//! Blends VCP, SES and approximate RS into one composite rank, then tags
//! the security with a phase and an execution strategy from its RS
//! dynamics and its distance to the 50-bar pivot. Every call is evaluated
//! fresh from the series; nothing is remembered between calls.

use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::trace;

use crate::analysis::{
    finite, require_history, rs_percent_approx, Analysis, RsRanker, ScoringResult, SesAnalyzer,
    VcpAnalyzer,
};
use crate::data::BarSeries;
use crate::indicators::{highest, mean, round_to, tail};

/// Minimum bars for a classification.
pub const PHASE_MIN_BARS: usize = 200;

/// Below this composite rank a security is rejected outright.
pub const REJECT_BELOW_RANK: i32 = 5;

const PIVOT_LOOKBACK: usize = 50;
const VOLUME_LOOKBACK: usize = 20;

// ============================================================================
// Types
// ============================================================================

/// Lifecycle phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Phase {
    /// Broken out with fading momentum
    #[serde(rename = "RELEASE")]
    Release,
    /// Fresh acceleration
    #[serde(rename = "IGNITION")]
    Ignition,
    /// High quality, quiet, near the pivot
    #[serde(rename = "ACCUMULATION")]
    Accumulation,
    #[serde(rename = "HOLD/WATCH")]
    HoldWatch,
    #[serde(rename = "WATCH")]
    Watch,
    /// Composite rank under 5
    #[serde(rename = "REJECTED")]
    Rejected,
    /// Not enough history to classify
    #[serde(rename = "ERR")]
    Error,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Release => "RELEASE",
            Phase::Ignition => "IGNITION",
            Phase::Accumulation => "ACCUMULATION",
            Phase::HoldWatch => "HOLD/WATCH",
            Phase::Watch => "WATCH",
            Phase::Rejected => "REJECTED",
            Phase::Error => "ERR",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Execution strategy attached to a phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Strategy {
    Trailing,
    Ese,
    Pbvh,
    None,
}

/// RS dynamics at the last bar.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Dynamics {
    /// (RS(t) - RS(t-1)) * 100, 1 dp
    pub rank_delta: f64,
    /// (RS(t) - RS(t-5)) * 20, 2 dp
    pub rank_5d_slope: f64,
    /// Last volume over the 20-bar mean, 2 dp
    pub vol_change_ratio: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Components {
    pub energy_vcp: i32,
    pub quality_ses: i32,
    pub momentum_rs: i32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PhaseMetrics {
    /// (50-bar high - price) / 50-bar high, as a percent (2 dp)
    pub dist_to_pivot_pct: f64,
    pub volume_ratio: f64,
}

/// ECR output for one security.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompositeResult {
    pub ticker: String,
    /// Composite rank, 0-100
    pub sentinel_rank: i32,
    pub phase: Phase,
    pub strategy: Strategy,
    /// Absent for rejected securities
    pub dynamics: Option<Dynamics>,
    pub components: Components,
    pub metrics: PhaseMetrics,
}

impl CompositeResult {
    /// Defined empty result: phase `ERR`, everything zero.
    pub fn empty_for(ticker: &str) -> Self {
        Self {
            ticker: ticker.to_string(),
            sentinel_rank: 0,
            phase: Phase::Error,
            strategy: Strategy::None,
            dynamics: Some(Dynamics::default()),
            components: Components::default(),
            metrics: PhaseMetrics::default(),
        }
    }

    pub fn is_rejected(&self) -> bool {
        self.phase == Phase::Rejected
    }
}

/// Already-computed analyzer outputs the engine can reuse.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PhaseInputs {
    pub vcp_score: i32,
    pub ses_score: i32,
    /// RS raw score at the last bar, `None` when unratable
    pub rs_raw: Option<f64>,
}

impl PhaseInputs {
    /// Run VCP, SES and the RS raw score over `bars`.
    pub fn compute(bars: &BarSeries) -> Self {
        Self {
            vcp_score: VcpAnalyzer::analyze(bars).into_value().score,
            ses_score: SesAnalyzer::analyze(bars).into_value().score,
            rs_raw: RsRanker::raw_score(bars).value().copied(),
        }
    }
}

// ============================================================================
// Rules
// ============================================================================

/// `min(100, (0.40 * vcp + 0.30 * ses + 0.30 * rs_pct) * bonus)`, truncated.
///
/// The bonus is 1.15 when vcp >= 95 and ses >= 80, 1.05 when vcp >= 85 and
/// ses >= 70.
pub fn composite_rank(vcp: i32, ses: i32, rs_pct: i32) -> i32 {
    let mut rank = vcp as f64 * 0.40 + ses as f64 * 0.30 + rs_pct as f64 * 0.30;
    if vcp >= 95 && ses >= 80 {
        rank *= 1.15;
    } else if vcp >= 85 && ses >= 70 {
        rank *= 1.05;
    }
    rank.clamp(0.0, 100.0).trunc() as i32
}

/// First matching rule wins; WATCH is the fallback.
pub fn classify_phase(rank: i32, dynamics: &Dynamics, dist_to_pivot: f64) -> (Phase, Strategy) {
    let delta = dynamics.rank_delta;
    let slope = dynamics.rank_5d_slope;
    let vol = dynamics.vol_change_ratio;

    if dist_to_pivot < -0.07 && slope <= 0.0 {
        (Phase::Release, Strategy::Trailing)
    } else if delta >= 15.0
        || (rank >= 75 && slope >= 3.0)
        || (rank >= 70 && vol >= 1.8 && slope > 1.0)
    {
        (Phase::Ignition, Strategy::Ese)
    } else if rank >= 80 && slope.abs() < 2.0 && (0.0..=0.08).contains(&dist_to_pivot) {
        (Phase::Accumulation, Strategy::Pbvh)
    } else if rank >= 65 {
        (Phase::HoldWatch, Strategy::None)
    } else {
        (Phase::Watch, Strategy::None)
    }
}

// ============================================================================
// Engine
// ============================================================================

pub struct PhaseEngine;

impl PhaseEngine {
    /// Classify from scratch.
    pub fn classify(ticker: &str, bars: &BarSeries) -> CompositeResult {
        Self::classify_with(ticker, bars, &PhaseInputs::compute(bars))
    }

    /// Classify reusing analyzer outputs computed by the caller.
    pub fn classify_with(ticker: &str, bars: &BarSeries, inputs: &PhaseInputs) -> CompositeResult {
        Self::evaluate(ticker, bars, inputs).into_value_or_else(|| CompositeResult::empty_for(ticker))
    }

    /// Like [`classify_with`](Self::classify_with) but keeps the reason an
    /// empty result was produced.
    pub fn evaluate(ticker: &str, bars: &BarSeries, inputs: &PhaseInputs) -> Analysis<CompositeResult> {
        Self::compute(ticker, bars, inputs).into()
    }

    fn compute(ticker: &str, bars: &BarSeries, inputs: &PhaseInputs) -> ScoringResult<CompositeResult> {
        require_history(bars.len(), PHASE_MIN_BARS)?;

        let closes = bars.closes();
        let highs = bars.highs();
        let volumes = bars.volumes();
        let len = closes.len();
        let price = closes[len - 1];

        let rs_pct = rs_percent_approx(inputs.rs_raw);
        let rank = composite_rank(inputs.vcp_score, inputs.ses_score, rs_pct);

        let pivot = highest(tail(&highs, PIVOT_LOOKBACK)).unwrap_or(price);
        let dist = round_to(finite((pivot - price) / pivot, "pivot distance")?, 4);

        let vol_avg = mean(tail(&volumes, VOLUME_LOOKBACK)).unwrap_or(0.0);
        let vol_ratio = if vol_avg > 0.0 {
            round_to(volumes[len - 1] / vol_avg, 2)
        } else {
            1.0
        };

        let components = Components {
            energy_vcp: inputs.vcp_score,
            quality_ses: inputs.ses_score,
            momentum_rs: rs_pct,
        };
        let metrics = PhaseMetrics {
            dist_to_pivot_pct: round_to(dist * 100.0, 2),
            volume_ratio: vol_ratio,
        };

        if rank < REJECT_BELOW_RANK {
            trace!(ticker, rank, "Rejected on composite rank");
            return Ok(CompositeResult {
                ticker: ticker.to_string(),
                sentinel_rank: rank,
                phase: Phase::Rejected,
                strategy: Strategy::None,
                dynamics: None,
                components,
                metrics,
            });
        }

        let rs_prev = RsRanker::raw_score_closes(&closes[..len - 1]).ok();
        let rs_week = RsRanker::raw_score_closes(&closes[..len - 5]).ok();
        let shifted = |then: Option<f64>, scale: f64, dp: i32| match (inputs.rs_raw, then) {
            (Some(now), Some(then)) => round_to((now - then) * scale, dp),
            _ => 0.0,
        };

        let dynamics = Dynamics {
            rank_delta: shifted(rs_prev, 100.0, 1),
            rank_5d_slope: shifted(rs_week, 20.0, 2),
            vol_change_ratio: vol_ratio,
        };

        let (phase, strategy) = classify_phase(rank, &dynamics, dist);
        trace!(ticker, rank, %phase, "Phase classified");

        Ok(CompositeResult {
            ticker: ticker.to_string(),
            sentinel_rank: rank,
            phase,
            strategy,
            dynamics: Some(dynamics),
            components,
            metrics,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{flat_series, tight_base_series, trending_series};
    use test_case::test_case;

    fn dyn_of(delta: f64, slope: f64, vol: f64) -> Dynamics {
        Dynamics {
            rank_delta: delta,
            rank_5d_slope: slope,
            vol_change_ratio: vol,
        }
    }

    #[test]
    fn test_composite_rank_weights_and_bonus() {
        assert_eq!(composite_rank(0, 0, 0), 0);
        assert_eq!(composite_rank(5, 0, 0), 2);
        // 36 + 22.5 + 15 = 73.5, * 1.05
        assert_eq!(composite_rank(90, 75, 50), 77);
        // 100 * 0.4 + 85 * 0.3 + 100 * 0.3 = 95.5, * 1.15, capped
        assert_eq!(composite_rank(100, 85, 100), 100);
        // no bonus without quality
        assert_eq!(composite_rank(100, 0, 50), 55);
    }

    #[test_case(70, dyn_of(0.0, -0.5, 1.0), -0.10, Phase::Release ; "broken out and fading")]
    #[test_case(90, dyn_of(20.0, 0.5, 1.0), -0.10, Phase::Ignition ; "release needs a flat slope")]
    #[test_case(40, dyn_of(15.0, 0.0, 1.0), 0.05, Phase::Ignition ; "rank jump")]
    #[test_case(75, dyn_of(0.0, 3.0, 1.0), 0.05, Phase::Ignition ; "steep slope")]
    #[test_case(70, dyn_of(0.0, 1.5, 1.8), 0.05, Phase::Ignition ; "volume push")]
    #[test_case(85, dyn_of(0.0, 1.0, 1.0), 0.05, Phase::Accumulation ; "quiet near pivot")]
    #[test_case(85, dyn_of(0.0, 1.0, 1.0), 0.09, Phase::HoldWatch ; "too far from pivot")]
    #[test_case(85, dyn_of(0.0, -2.5, 1.0), 0.0, Phase::HoldWatch ; "slope too steep for accumulation")]
    #[test_case(65, dyn_of(0.0, 0.0, 1.0), 0.20, Phase::HoldWatch ; "hold threshold")]
    #[test_case(64, dyn_of(0.0, 0.0, 1.0), 0.20, Phase::Watch ; "fallback")]
    fn test_classify_phase(rank: i32, dynamics: Dynamics, dist: f64, expected: Phase) {
        assert_eq!(classify_phase(rank, &dynamics, dist).0, expected);
    }

    #[test]
    fn test_strategy_tags() {
        assert_eq!(classify_phase(70, &dyn_of(0.0, -1.0, 1.0), -0.2).1, Strategy::Trailing);
        assert_eq!(classify_phase(70, &dyn_of(16.0, 0.0, 1.0), 0.0).1, Strategy::Ese);
        assert_eq!(classify_phase(90, &dyn_of(0.0, 0.0, 1.0), 0.01).1, Strategy::Pbvh);
        assert_eq!(classify_phase(66, &dyn_of(0.0, 0.0, 1.0), 0.5).1, Strategy::None);
    }

    #[test]
    fn test_short_series_is_error_not_rejected() {
        let result = PhaseEngine::classify("SHORT", &trending_series(199, 10.0, 0.1));
        assert_eq!(result, CompositeResult::empty_for("SHORT"));
        assert_eq!(result.phase, Phase::Error);
        assert!(!result.is_rejected());

        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["phase"], "ERR");
        assert_eq!(json["strategy"], "NONE");
    }

    #[test]
    fn test_low_rank_rejected_before_dynamics() {
        // A strong series still short-circuits when the supplied scores are weak
        let bars = tight_base_series();
        let inputs = PhaseInputs {
            vcp_score: 5,
            ses_score: 0,
            rs_raw: None,
        };
        let result = PhaseEngine::classify_with("LOW", &bars, &inputs);
        assert_eq!(result.sentinel_rank, 2);
        assert_eq!(result.phase, Phase::Rejected);
        assert_eq!(result.strategy, Strategy::None);
        assert!(result.dynamics.is_none());
    }

    /// Flat closes sit 0.5% under the 20-bar high with zero RS dynamics.
    fn quiet_near_pivot() -> (BarSeries, f64) {
        let bars = flat_series(260, 50.0);
        let raw = RsRanker::raw_score(&bars).value().copied().unwrap();
        (bars, raw)
    }

    #[test]
    fn test_quiet_near_pivot_accumulates() {
        let (bars, raw) = quiet_near_pivot();
        let inputs = PhaseInputs {
            vcp_score: 95,
            ses_score: 80,
            rs_raw: Some(raw),
        };
        let result = PhaseEngine::classify_with("QUIET", &bars, &inputs);

        // (38 + 24 + 9) * 1.15
        assert_eq!(result.sentinel_rank, 81);
        assert_eq!(result.phase, Phase::Accumulation);
        assert_eq!(result.strategy, Strategy::Pbvh);
        assert_eq!(result.dynamics, Some(dyn_of(0.0, 0.0, 1.0)));
    }

    #[test]
    fn test_accumulation_candidate_rejected_on_low_rank() {
        let (bars, _) = quiet_near_pivot();
        let inputs = PhaseInputs {
            vcp_score: 8,
            ses_score: 0,
            rs_raw: None,
        };
        let result = PhaseEngine::classify_with("QUIET", &bars, &inputs);

        assert_eq!(result.sentinel_rank, 3);
        assert_eq!(result.phase, Phase::Rejected);
        assert_eq!(result.strategy, Strategy::None);
        assert_eq!(result.dynamics, None);
        assert!(result.is_rejected());
    }

    #[test_case(12, 4, Phase::Rejected ; "rank 4 rejected")]
    #[test_case(13, 5, Phase::Watch ; "rank 5 classified")]
    fn test_reject_boundary_is_exclusive(vcp: i32, rank: i32, expected: Phase) {
        let (bars, _) = quiet_near_pivot();
        let inputs = PhaseInputs {
            vcp_score: vcp,
            ses_score: 0,
            rs_raw: None,
        };
        let result = PhaseEngine::classify_with("EDGE", &bars, &inputs);

        assert_eq!(result.sentinel_rank, rank);
        assert_eq!(result.phase, expected);
        assert_eq!(result.dynamics.is_some(), expected != Phase::Rejected);
    }

    #[test]
    fn test_tight_base_classification() {
        let bars = tight_base_series();
        let result = PhaseEngine::classify("BASE", &bars);

        assert_eq!(result.components.energy_vcp, 100);
        assert_eq!(result.metrics.dist_to_pivot_pct, 8.74);
        assert_eq!(result.metrics.volume_ratio, 1.0);
        let dynamics = result.dynamics.unwrap();
        assert!(dynamics.rank_delta.abs() < 15.0);
        assert!(dynamics.rank_5d_slope < 0.0);
        assert!(matches!(result.phase, Phase::HoldWatch | Phase::Watch));
    }

    #[test]
    fn test_classify_matches_precomputed_inputs() {
        let bars = trending_series(260, 20.0, 0.25);
        let fresh = PhaseEngine::classify("UP", &bars);
        let reused = PhaseEngine::classify_with("UP", &bars, &PhaseInputs::compute(&bars));
        assert_eq!(fresh, reused);
    }

    #[test]
    fn test_phase_serialization() {
        assert_eq!(serde_json::to_string(&Phase::HoldWatch).unwrap(), "\"HOLD/WATCH\"");
        assert_eq!(Phase::Accumulation.to_string(), "ACCUMULATION");
        assert_eq!(serde_json::to_string(&Strategy::Pbvh).unwrap(), "\"PBVH\"");
    }
}
