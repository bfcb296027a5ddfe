//! Breakout replay used as a profit-factor sanity gate.
//!
//! A single position at a time over the trailing window of one series:
//! enter when the close clears the prior 20-bar high while above its 50-bar
//! average, leave on the ATR stop, the R-multiple target, or the last bar.
//! Outcomes are measured in R (multiples of the initial risk).

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sentinel_common::ScoringConfig;
use tracing::trace;

use crate::analysis::{require_history, Analysis, EmptyResult, ScoringError, ScoringResult};
use crate::data::BarSeries;
use crate::indicators::{atr_series, highest, round_to, sma_at, ATR_PERIOD};

/// Minimum bars before the replay runs.
pub const VALIDATOR_MIN_BARS: usize = 200;

/// Bars replayed at the end of the series.
const REPLAY_WINDOW: usize = 250;

/// Earliest bar the replay may start from (MA50 warm-up).
const REPLAY_FLOOR: usize = 50;

const BREAKOUT_LOOKBACK: usize = 20;
const TREND_MA: usize = 50;

/// Cap on the reported profit factor.
const MAX_PROFIT_FACTOR: f64 = 10.0;
/// Reported when trades only ever won.
const ALL_WINNERS_PROFIT_FACTOR: f64 = 5.0;
/// Reported when nothing can be said.
const NEUTRAL_PROFIT_FACTOR: f64 = 1.0;

/// How a simulated trade closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitReason {
    Stop,
    Target,
    /// Marked to market on the last bar
    EndOfWindow,
}

/// One replayed trade
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulatedTrade {
    pub entry_index: usize,
    pub entry_date: NaiveDate,
    pub exit_index: usize,
    pub exit_date: NaiveDate,
    pub entry_price: f64,
    pub stop_price: f64,
    /// Outcome in multiples of the initial risk
    pub r_multiple: f64,
    pub exit: ExitReason,
}

impl SimulatedTrade {
    pub fn is_winner(&self) -> bool {
        self.r_multiple > 0.0
    }

    /// Holding period in bars.
    pub fn holding_bars(&self) -> usize {
        self.exit_index - self.entry_index
    }
}

/// Result of one replay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationReport {
    /// Gross positive R over gross negative R, capped at 10 (2 dp)
    pub profit_factor: f64,
    pub trades: Vec<SimulatedTrade>,
    pub wins: usize,
    pub losses: usize,
    pub gross_positive_r: f64,
    pub gross_negative_r: f64,
}

impl ValidationReport {
    fn from_trades(trades: Vec<SimulatedTrade>) -> Self {
        let outcomes: Vec<f64> = trades.iter().map(|t| t.r_multiple).collect();
        Self {
            profit_factor: profit_factor_from(&outcomes),
            wins: outcomes.iter().filter(|r| **r > 0.0).count(),
            losses: outcomes.iter().filter(|r| **r < 0.0).count(),
            gross_positive_r: outcomes.iter().filter(|r| **r > 0.0).sum(),
            gross_negative_r: outcomes.iter().filter(|r| **r < 0.0).map(|r| r.abs()).sum(),
            trades,
        }
    }
}

impl EmptyResult for ValidationReport {
    fn empty() -> Self {
        Self::from_trades(Vec::new())
    }
}

/// Profit factor over R outcomes.
///
/// `min(10, positive / negative)` when any loss exists, otherwise 5.0 if
/// anything won and 1.0 if nothing did. Rounded to 2 dp.
pub fn profit_factor_from(outcomes: &[f64]) -> f64 {
    if outcomes.is_empty() {
        return NEUTRAL_PROFIT_FACTOR;
    }

    let positive: f64 = outcomes.iter().filter(|r| **r > 0.0).sum();
    let negative: f64 = outcomes.iter().filter(|r| **r < 0.0).map(|r| r.abs()).sum();

    let factor = if negative > 0.0 {
        positive / negative
    } else if positive > 0.0 {
        ALL_WINNERS_PROFIT_FACTOR
    } else {
        NEUTRAL_PROFIT_FACTOR
    };
    round_to(factor.min(MAX_PROFIT_FACTOR), 2)
}

struct OpenPosition {
    index: usize,
    entry: f64,
    stop: f64,
}

impl OpenPosition {
    fn risk(&self) -> f64 {
        self.entry - self.stop
    }
}

/// Breakout/stop/target replay.
#[derive(Debug, Clone)]
pub struct StrategyValidator {
    stop_loss_atr: f64,
    target_r_multiple: f64,
}

impl StrategyValidator {
    pub fn new(config: &ScoringConfig) -> Self {
        Self {
            stop_loss_atr: config.stop_loss_atr,
            target_r_multiple: config.target_r_multiple,
        }
    }

    /// Replay the trailing window.
    ///
    /// Fewer than 200 bars gives the empty report (profit factor 1.0).
    pub fn run(&self, bars: &BarSeries) -> Analysis<ValidationReport> {
        self.replay(bars).into()
    }

    /// Just the profit factor, 1.0 when the replay could not run.
    pub fn profit_factor(&self, bars: &BarSeries) -> f64 {
        self.run(bars).into_value().profit_factor
    }

    fn replay(&self, series: &BarSeries) -> ScoringResult<ValidationReport> {
        require_history(series.len(), VALIDATOR_MIN_BARS)?;

        let bars = series.bars();
        let closes = series.closes();
        let highs = series.highs();
        let atrs = atr_series(bars, ATR_PERIOD);
        let last = bars.len() - 1;
        let start = REPLAY_FLOOR.max(bars.len().saturating_sub(REPLAY_WINDOW));

        let mut trades = Vec::new();
        let mut position: Option<OpenPosition> = None;

        for i in start..bars.len() {
            let bar = &bars[i];

            if let Some(open) = &position {
                let risk = open.risk();
                let exit = if bar.low <= open.stop {
                    Some((-1.0, ExitReason::Stop))
                } else if bar.high >= open.entry + risk * self.target_r_multiple {
                    Some((self.target_r_multiple, ExitReason::Target))
                } else if i == last {
                    let r = if risk > 0.0 {
                        (bar.close - open.entry) / risk
                    } else {
                        0.0
                    };
                    Some((r, ExitReason::EndOfWindow))
                } else {
                    None
                };

                if let Some((r_multiple, reason)) = exit {
                    trades.push(SimulatedTrade {
                        entry_index: open.index,
                        entry_date: bars[open.index].date,
                        exit_index: i,
                        exit_date: bar.date,
                        entry_price: open.entry,
                        stop_price: open.stop,
                        r_multiple,
                        exit: reason,
                    });
                    position = None;
                }
                continue;
            }

            let pivot = highest(&highs[i - BREAKOUT_LOOKBACK..i])
                .ok_or_else(|| ScoringError::fault("empty breakout window"))?;
            let trend = sma_at(&closes, TREND_MA, i)
                .ok_or_else(|| ScoringError::fault("trend average unavailable"))?;

            if bar.close > pivot && bar.close > trend {
                let atr = atrs[i].ok_or_else(|| ScoringError::fault("ATR unavailable"))?;
                position = Some(OpenPosition {
                    index: i,
                    entry: bar.close,
                    stop: bar.close - atr * self.stop_loss_atr,
                });
            }
        }

        let report = ValidationReport::from_trades(trades);
        trace!(
            trades = report.trades.len(),
            wins = report.wins,
            losses = report.losses,
            profit_factor = report.profit_factor,
            "Breakout replay complete"
        );
        Ok(report)
    }
}
