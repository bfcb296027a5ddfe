//! Universe screener.
//!
//! Scores a ticker universe with every analyzer and renders the result.
//!
//! # Pipeline
//!
//! ```text
//! ┌──────────────┐   ┌──────────────┐   ┌──────────────┐   ┌──────────────┐
//! │ fetch bars   │──▶│ raw RS       │──▶│ percentile   │──▶│ per-ticker   │
//! │ (provider)   │   │ (per ticker) │   │ (barrier)    │   │ scoring      │
//! └──────────────┘   └──────────────┘   └──────────────┘   └──────┬───────┘
//!                                                                 │
//!                                                   ┌─────────────▼──────┐
//!                                                   │ ScreenerReport     │
//!                                                   │ (markdown / json)  │
//!                                                   └────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use sentinel_scoring::screener::{ScreenerEngine, ScreenerReport};
//!
//! let engine = ScreenerEngine::new(scoring, screener, provider);
//! let result = engine.run_scan(&tickers).await?;
//! let report = ScreenerReport::new(result, 20);
//! ```

pub mod engine;
pub mod report;

pub use engine::{
    composite_score, method_hits, passes_thresholds, ScanStage, ScoreCard, ScreenerEngine,
    ScreenerEntry, ScreenerResult, StageCount, Status,
};
pub use report::{
    build_method_comparison, build_phase_summary, build_rankings, AverageScores, MethodComparison,
    PhaseMember, RankingMethod, Rankings, ReportFormat, ScreenerReport,
};
