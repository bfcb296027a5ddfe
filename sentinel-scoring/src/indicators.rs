//! Price and volume indicators shared by the analyzers.
//!
//! Everything here works on plain slices, oldest value first. Functions that
//! need more history than they are given return `None` instead of guessing.

use statrs::statistics::Statistics;

use crate::data::Bar;

/// ATR window used throughout.
pub const ATR_PERIOD: usize = 14;

/// True range per bar.
///
/// The first bar has no previous close, so its true range is its own range.
pub fn true_ranges(bars: &[Bar]) -> Vec<f64> {
    let mut out = Vec::with_capacity(bars.len());
    if let Some(first) = bars.first() {
        out.push(first.range());
    }
    out.extend(bars.windows(2).map(|w| {
        let prev = &w[0];
        let curr = &w[1];
        let tr1 = curr.high - curr.low;
        let tr2 = (curr.high - prev.close).abs();
        let tr3 = (curr.low - prev.close).abs();
        tr1.max(tr2).max(tr3)
    }));
    out
}

/// Average True Range at the last bar: mean of the trailing `period` true ranges.
pub fn atr(bars: &[Bar], period: usize) -> Option<f64> {
    let tr = true_ranges(bars);
    if period == 0 || tr.len() < period {
        return None;
    }
    mean(&tr[tr.len() - period..])
}

/// Rolling ATR aligned with `bars`; `None` until `period` true ranges exist.
pub fn atr_series(bars: &[Bar], period: usize) -> Vec<Option<f64>> {
    let tr = true_ranges(bars);
    (0..tr.len())
        .map(|i| {
            if period == 0 || i + 1 < period {
                None
            } else {
                mean(&tr[i + 1 - period..=i])
            }
        })
        .collect()
}

/// Arithmetic mean. `None` for an empty slice.
pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

/// Simple moving average ending at the last value.
pub fn sma(values: &[f64], period: usize) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    sma_at(values, period, values.len() - 1)
}

/// Simple moving average of the `period` values ending at index `i` (inclusive).
pub fn sma_at(values: &[f64], period: usize, i: usize) -> Option<f64> {
    if period == 0 || i >= values.len() || i + 1 < period {
        return None;
    }
    mean(&values[i + 1 - period..=i])
}

pub fn highest(values: &[f64]) -> Option<f64> {
    values.iter().copied().reduce(f64::max)
}

pub fn lowest(values: &[f64]) -> Option<f64> {
    values.iter().copied().reduce(f64::min)
}

/// The last `n` values (all of them when fewer exist).
pub fn tail(values: &[f64], n: usize) -> &[f64] {
    &values[values.len().saturating_sub(n)..]
}

/// Period-over-period fractional change; `changes[k]` is the change into `values[k + 1]`.
pub fn pct_changes(values: &[f64]) -> Vec<f64> {
    values.windows(2).map(|w| w[1] / w[0] - 1.0).collect()
}

/// Bar-to-bar differences; `diffs[k]` is `values[k + 1] - values[k]`.
pub fn diffs(values: &[f64]) -> Vec<f64> {
    values.windows(2).map(|w| w[1] - w[0]).collect()
}

/// Sample standard deviation (n - 1 denominator). `None` below two values.
pub fn std_dev(values: &[f64]) -> Option<f64> {
    if values.len() < 2 {
        return None;
    }
    Some(values.std_dev())
}

/// Round to `dp` decimal places.
pub fn round_to(value: f64, dp: i32) -> f64 {
    let factor = 10f64.powi(dp);
    (value * factor).round() / factor
}
