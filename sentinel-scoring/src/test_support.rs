//! Deterministic bar generators for unit tests.

use chrono::{Duration, NaiveDate};

use crate::data::{Bar, BarSeries};

pub fn day(i: usize) -> NaiveDate {
    NaiveDate::from_ymd_opt(2020, 1, 1).unwrap() + Duration::days(i as i64)
}

pub fn make_bar(i: usize, open: f64, high: f64, low: f64, close: f64, volume: f64) -> Bar {
    Bar {
        date: day(i),
        open,
        high,
        low,
        close,
        volume,
    }
}

/// Bars with a symmetric +/-0.5% range around each close and constant volume.
pub fn series_from_closes(closes: &[f64]) -> BarSeries {
    let bars = closes
        .iter()
        .enumerate()
        .map(|(i, &c)| make_bar(i, c, c * 1.005, c * 0.995, c, 1_000_000.0))
        .collect();
    BarSeries::new(bars).unwrap()
}

/// Linear trend: `close[i] = start + step * i`.
pub fn trending_series(n: usize, start: f64, step: f64) -> BarSeries {
    let closes: Vec<f64> = (0..n).map(|i| start + step * i as f64).collect();
    series_from_closes(&closes)
}

pub fn flat_series(n: usize, price: f64) -> BarSeries {
    series_from_closes(&vec![price; n])
}

/// A 300-bar base: 280 rising bars, then 20 bars with a 1% range on 30%
/// of the prior volume, and a wick spike 45 bars back that keeps price
/// more than 8% below the 50-bar high.
pub fn tight_base_series() -> BarSeries {
    let mut bars = Vec::with_capacity(300);
    for i in 0..280 {
        let c = 50.0 + 0.2 * i as f64;
        bars.push(make_bar(i, c, c * 1.005, c * 0.995, c, 1_000_000.0));
    }
    for i in 280..300 {
        bars.push(make_bar(i, 106.0, 106.53, 105.47, 106.0, 300_000.0));
    }
    bars[255].high = bars[255].close * 1.15;
    BarSeries::new(bars).unwrap()
}
