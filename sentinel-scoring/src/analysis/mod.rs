//! Signal analyzers.
//!
//! Each analyzer is a pure function of a bar series (plus optional
//! fundamentals) and the scoring configuration. None of them ever fails
//! outward: insufficient history, an unratable series or a numeric fault
//! all surface as [`Analysis::Empty`] carrying the reason, and
//! [`Analysis::into_value`] turns that into the analyzer's defined empty
//! result.
//!
//! # Analyzers
//! - **vcp**: volatility contraction (0-105)
//! - **rs**: relative strength raw blend and cross-sectional rating (1-99)
//! - **canslim**: fundamental momentum grade (0-100)
//! - **ses**: efficiency score (0-100)

pub mod canslim;
pub mod rs;
pub mod ses;
pub mod vcp;

pub use canslim::{CanslimAnalyzer, CanslimBreakdown, CanslimMetrics, CanslimScore, Grade};
pub use rs::{rs_percent_approx, rs_rating_approx, PercentileRecord, RawRsRecord, RsRanker};
pub use ses::{SesAnalyzer, SesBreakdown, SesMetrics, SesScore};
pub use vcp::{VcpAnalyzer, VcpBreakdown, VcpScore, VcpSignal};

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

// ============================================================================
// Errors and Result Boundary
// ============================================================================

/// Why an analyzer produced no signal.
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ScoringError {
    /// Series shorter than the analyzer's minimum
    #[error("insufficient history: need {required} bars, have {available}")]
    InsufficientHistory { required: usize, available: usize },

    /// Relative strength could not be rated
    #[error("relative strength raw score is invalid")]
    InvalidRawScore,

    /// Numeric fault during scoring (non-finite value, zero denominator)
    #[error("computation fault: {reason}")]
    ComputationFault { reason: String },
}

impl ScoringError {
    pub fn fault(reason: impl Into<String>) -> Self {
        Self::ComputationFault {
            reason: reason.into(),
        }
    }
}

pub type ScoringResult<T> = Result<T, ScoringError>;

/// Fail with `InsufficientHistory` when fewer than `required` bars exist.
pub(crate) fn require_history(available: usize, required: usize) -> ScoringResult<()> {
    if available < required {
        return Err(ScoringError::InsufficientHistory {
            required,
            available,
        });
    }
    Ok(())
}

/// Reject non-finite intermediates.
pub(crate) fn finite(value: f64, what: &str) -> ScoringResult<f64> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(ScoringError::fault(format!("{what} is not finite")))
    }
}

/// The defined neutral result of an analyzer.
pub trait EmptyResult {
    fn empty() -> Self;
}

/// Outcome of one analyzer call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", content = "value", rename_all = "snake_case")]
pub enum Analysis<T> {
    /// Scores computed from the series
    Computed(T),
    /// No signal, with the reason
    Empty(ScoringError),
}

impl<T> Analysis<T> {
    pub fn is_computed(&self) -> bool {
        matches!(self, Self::Computed(_))
    }

    /// The computed value, if any.
    pub fn value(&self) -> Option<&T> {
        match self {
            Self::Computed(v) => Some(v),
            Self::Empty(_) => None,
        }
    }

    /// The reason no value was computed.
    pub fn reason(&self) -> Option<&ScoringError> {
        match self {
            Self::Computed(_) => None,
            Self::Empty(reason) => Some(reason),
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Analysis<U> {
        match self {
            Self::Computed(v) => Analysis::Computed(f(v)),
            Self::Empty(reason) => Analysis::Empty(reason),
        }
    }

    /// The computed value, or the analyzer's defined empty result.
    pub fn into_value(self) -> T
    where
        T: EmptyResult,
    {
        match self {
            Self::Computed(v) => v,
            Self::Empty(_) => T::empty(),
        }
    }

    /// The computed value, or an empty result built by `empty`.
    ///
    /// For empty results that carry an identifier.
    pub fn into_value_or_else(self, empty: impl FnOnce() -> T) -> T {
        match self {
            Self::Computed(v) => v,
            Self::Empty(_) => empty(),
        }
    }
}

impl<T> From<ScoringResult<T>> for Analysis<T> {
    fn from(result: ScoringResult<T>) -> Self {
        match result {
            Ok(v) => Self::Computed(v),
            Err(reason) => {
                tracing::trace!(%reason, "Analyzer produced no signal");
                Self::Empty(reason)
            }
        }
    }
}

// ============================================================================
// Generic Score View
// ============================================================================

/// Uniform view over any analyzer's output.
///
/// `score == clamp(sum(breakdown), 0, max_score)` holds for every analyzer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreResult {
    pub score: i32,
    pub breakdown: BTreeMap<String, i32>,
    pub metrics: BTreeMap<String, f64>,
}

impl ScoreResult {
    /// Whether `score` equals the clamped breakdown sum.
    pub fn is_consistent(&self, max_score: i32) -> bool {
        let sum: i32 = self.breakdown.values().sum();
        self.score == sum.clamp(0, max_score)
    }
}

/// Analyzer outputs that can be flattened into a [`ScoreResult`].
pub trait Scored {
    /// Upper bound of the score scale.
    const MAX_SCORE: i32;

    fn score(&self) -> i32;

    fn score_result(&self) -> ScoreResult;
}

pub(crate) fn breakdown_map<const N: usize>(items: [(&str, i32); N]) -> BTreeMap<String, i32> {
    items.into_iter().map(|(k, v)| (k.to_string(), v)).collect()
}

pub(crate) fn metrics_map<const N: usize>(items: [(&str, f64); N]) -> BTreeMap<String, f64> {
    items.into_iter().map(|(k, v)| (k.to_string(), v)).collect()
}
