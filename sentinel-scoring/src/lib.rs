//! Sentinel Scoring Library
//!
//! Signal scoring and cross-sectional ranking for daily equity bars.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │                        sentinel-scoring                             │
//! ├─────────────────────────────────────────────────────────────────────┤
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────┐     │
//! │  │  Data           │  │  Analyzers      │  │  Phase Engine   │     │
//! │  │  (providers)    │─▶│  VCP RS CANSLIM │─▶│  (ECR)          │     │
//! │  │                 │  │  SES validator  │  │                 │     │
//! │  └─────────────────┘  └─────────────────┘  └─────────────────┘     │
//! │           │                    │                    │               │
//! │  ┌────────▼────────────────────▼────────────────────▼────────┐     │
//! │  │   Screener (batch scan)   │   Signal study (walk-forward)  │     │
//! │  └────────────────────────────────────────────────────────────┘     │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Key Concepts
//!
//! ## Two-phase relative strength
//! - Phase A computes a raw weighted return blend per ticker
//! - Phase B ranks the whole batch into 1-99 percentile ratings
//! - Every other analyzer is independent per ticker
//!
//! ## Empty results
//! - Analyzers never fail outward; short or broken input yields
//!   [`analysis::Analysis::Empty`] and a defined neutral result

#![warn(clippy::all)]
#![allow(clippy::pedantic)]

pub mod analysis;
pub mod backtest;
pub mod data;
pub mod indicators;
pub mod phase;
pub mod screener;

#[cfg(test)]
mod test_support;

pub use analysis::{Analysis, ScoreResult, Scored, ScoringError};
pub use backtest::{SignalStudy, StrategyValidator, StudyReport};
pub use data::{Bar, BarProvider, BarSeries, FundamentalsProvider, InMemoryProvider, LocalBarStore};
pub use phase::{CompositeResult, Phase, PhaseEngine, Strategy};
pub use screener::{ScreenerEngine, ScreenerReport, ScreenerResult};
