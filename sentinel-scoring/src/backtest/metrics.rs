//! Forward-return statistics for the signal study.

use serde::{Deserialize, Serialize};

use crate::indicators::round_to;

/// Profit factor reported when there were wins and no losses.
pub const NO_LOSS_PROFIT_FACTOR: f64 = 99.0;

/// Aggregate of a set of forward returns (percent).
///
/// A return of exactly zero counts as a loss.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReturnStats {
    pub signal_count: usize,
    /// Percent of positive returns (1 dp)
    pub win_rate: f64,
    pub avg_return: f64,
    pub avg_win: Option<f64>,
    pub avg_loss: Option<f64>,
    /// Gross wins / gross losses (2 dp)
    pub profit_factor: f64,
    /// Worst single return
    pub max_loss: f64,
    /// Expected return per signal
    pub expectancy: f64,
}

impl ReturnStats {
    /// `None` for an empty set.
    pub fn from_returns(returns: &[f64]) -> Option<Self> {
        if returns.is_empty() {
            return None;
        }

        let n = returns.len() as f64;
        let wins: Vec<f64> = returns.iter().copied().filter(|r| *r > 0.0).collect();
        let losses: Vec<f64> = returns.iter().copied().filter(|r| *r <= 0.0).collect();

        let win_rate = round_to(wins.len() as f64 / n * 100.0, 1);
        let avg_win = average(&wins).map(|v| round_to(v, 2));
        let avg_loss = average(&losses).map(|v| round_to(v, 2));

        let gross_win: f64 = wins.iter().sum();
        let gross_loss = losses.iter().sum::<f64>().abs();
        let profit_factor = if gross_loss > 0.0 {
            round_to(gross_win / gross_loss, 2)
        } else if gross_win > 0.0 {
            NO_LOSS_PROFIT_FACTOR
        } else {
            0.0
        };

        let p = win_rate / 100.0;
        let expectancy = round_to(p * avg_win.unwrap_or(0.0) + (1.0 - p) * avg_loss.unwrap_or(0.0), 2);

        Some(Self {
            signal_count: returns.len(),
            win_rate,
            avg_return: round_to(returns.iter().sum::<f64>() / n, 2),
            avg_win,
            avg_loss,
            profit_factor,
            max_loss: round_to(returns.iter().copied().fold(f64::INFINITY, f64::min), 2),
            expectancy,
        })
    }
}

/// Count, win rate and average return for one bucket of signals.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BucketStats {
    pub label: String,
    pub count: usize,
    pub win_rate: f64,
    pub avg_return: f64,
}

impl BucketStats {
    pub fn from_returns(label: impl Into<String>, returns: &[f64]) -> Option<Self> {
        let avg = average(returns)?;
        let wins = returns.iter().filter(|r| **r > 0.0).count();
        Some(Self {
            label: label.into(),
            count: returns.len(),
            win_rate: round_to(wins as f64 / returns.len() as f64 * 100.0, 1),
            avg_return: round_to(avg, 2),
        })
    }
}

fn average(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}
