//! Bar generators shared by the integration tests.

#![allow(dead_code)]

use chrono::{Duration, NaiveDate};
use sentinel_scoring::data::{Bar, BarSeries};

/// Daily bars from 2020-01-01 with a +/-0.5% range and constant volume.
pub fn series_from_closes(closes: &[f64]) -> BarSeries {
    let start = NaiveDate::from_ymd_opt(2020, 1, 1).unwrap();
    let bars = closes
        .iter()
        .enumerate()
        .map(|(i, &c)| Bar {
            date: start + Duration::days(i as i64),
            open: c,
            high: c * 1.005,
            low: c * 0.995,
            close: c,
            volume: 1_000_000.0,
        })
        .collect();
    BarSeries::new(bars).unwrap()
}

pub fn trending_series(n: usize, start: f64, step: f64) -> BarSeries {
    let closes: Vec<f64> = (0..n).map(|i| start + step * i as f64).collect();
    series_from_closes(&closes)
}

pub fn flat_series(n: usize, price: f64) -> BarSeries {
    series_from_closes(&vec![price; n])
}

pub fn tickers(names: &[&str]) -> Vec<String> {
    names.iter().map(|s| s.to_string()).collect()
}
