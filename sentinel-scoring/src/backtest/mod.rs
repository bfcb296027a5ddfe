//! Historical replays.
//!
//! - [`validator`]: the breakout/stop/target profit-factor gate run per ticker
//!   during a scan
//! - [`study`]: walk-forward forward-return study of every scoring method

mod metrics;
mod report;
pub mod study;
pub mod validator;

pub use metrics::{BucketStats, ReturnStats, NO_LOSS_PROFIT_FACTOR};
pub use report::{aggregate, score_distribution, HoldStats, MethodStats, ScoreDistribution, StudyReport};
pub use study::{forward_return, Method, ScoreKey, SignalStudy, StudySignal, WindowScores};
pub use validator::{
    profit_factor_from, ExitReason, SimulatedTrade, StrategyValidator, ValidationReport, VALIDATOR_MIN_BARS,
};
