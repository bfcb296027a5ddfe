//! Walk-forward signal study.
//!
//! Replays every analyzer on growing prefixes of each ticker's history and
//! records, for windows where any method fires, the forward returns over
//! the configured holding periods. Only data up to the evaluation bar is
//! visible to the analyzers.

use chrono::NaiveDate;
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use sentinel_common::StudyConfig;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

use super::report::StudyReport;
use crate::analysis::{
    rs_rating_approx, CanslimAnalyzer, CanslimScore, Grade, RsRanker, SesAnalyzer, VcpAnalyzer,
};
use crate::data::{BarProvider, BarSeries};
use crate::indicators::round_to;
use crate::phase::{Phase, PhaseEngine, PhaseInputs};

// ============================================================================
// Methods
// ============================================================================

/// A selection method whose signals are studied independently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Method {
    /// VCP >= 60 and RS >= 70
    VcpRs,
    /// ECR rank >= 65 in IGNITION or ACCUMULATION
    Ecr,
    /// CANSLIM >= 50
    Canslim,
    /// SES >= 65
    Ses,
}

impl Method {
    pub const ALL: [Method; 4] = [Method::VcpRs, Method::Ecr, Method::Canslim, Method::Ses];

    pub fn as_str(&self) -> &'static str {
        match self {
            Method::VcpRs => "vcp_rs",
            Method::Ecr => "ecr",
            Method::Canslim => "canslim",
            Method::Ses => "ses",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Method::VcpRs => "VCP x RS",
            Method::Ecr => "ECR",
            Method::Canslim => "CANSLIM",
            Method::Ses => "SES",
        }
    }

    /// Whether the method fires on a set of scores.
    pub fn fires(&self, scores: &WindowScores) -> bool {
        match self {
            Method::VcpRs => scores.vcp >= 60 && scores.rs >= 70,
            Method::Ecr => {
                scores.ecr_rank >= 65
                    && matches!(scores.ecr_phase, Phase::Ignition | Phase::Accumulation)
            }
            Method::Canslim => scores.canslim >= 50,
            Method::Ses => scores.ses >= 65,
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Score a signal can be bucketed by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoreKey {
    Vcp,
    Rs,
    EcrRank,
    Canslim,
    Ses,
}

impl ScoreKey {
    pub fn of(&self, scores: &WindowScores) -> i32 {
        match self {
            ScoreKey::Vcp => scores.vcp,
            ScoreKey::Rs => i32::from(scores.rs),
            ScoreKey::EcrRank => scores.ecr_rank,
            ScoreKey::Canslim => scores.canslim,
            ScoreKey::Ses => scores.ses,
        }
    }
}

// ============================================================================
// Signals
// ============================================================================

/// All analyzer scores at one evaluation bar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindowScores {
    pub vcp: i32,
    /// Approximate 1-99 rating
    pub rs: u8,
    pub ses: i32,
    pub ecr_rank: i32,
    pub ecr_phase: Phase,
    pub canslim: i32,
    pub canslim_grade: Grade,
}

/// One evaluation window where at least one method fired.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StudySignal {
    pub ticker: String,
    pub date: NaiveDate,
    pub scores: WindowScores,
    pub triggered: Vec<Method>,
    /// (holding period in bars, return in percent)
    pub returns: Vec<(usize, f64)>,
}

impl StudySignal {
    pub fn fired(&self, method: Method) -> bool {
        self.triggered.contains(&method)
    }

    pub fn return_for(&self, hold: usize) -> Option<f64> {
        self.returns.iter().find(|(h, _)| *h == hold).map(|(_, r)| *r)
    }
}

/// `(close[i + hold] - close[i]) / close[i] * 100` to 2 dp.
///
/// `None` when the exit bar is past the end or the entry price is not positive.
pub fn forward_return(closes: &[f64], i: usize, hold: usize) -> Option<f64> {
    let exit = *closes.get(i + hold)?;
    let entry = *closes.get(i)?;
    if entry <= 0.0 {
        return None;
    }
    Some(round_to((exit - entry) / entry * 100.0, 2))
}

// ============================================================================
// Study Runner
// ============================================================================

/// Walk-forward study over a bar provider.
pub struct SignalStudy<P: BarProvider> {
    provider: Arc<P>,
    config: StudyConfig,
    max_concurrency: usize,
}

impl<P: BarProvider + 'static> SignalStudy<P> {
    pub fn new(provider: Arc<P>, config: StudyConfig, max_concurrency: usize) -> Self {
        Self {
            provider,
            config,
            max_concurrency: max_concurrency.max(1),
        }
    }

    /// Evaluation bar indices for a series of `len` bars.
    pub fn window_indices(&self, len: usize) -> Vec<usize> {
        let longest = self.config.hold_days.iter().copied().max().unwrap_or(0);
        let end = len.saturating_sub(longest + 1);
        (self.config.warmup_bars..end)
            .step_by(self.config.scan_step.max(1))
            .collect()
    }

    /// Signals for one ticker.
    pub fn evaluate_ticker(&self, ticker: &str, bars: &BarSeries) -> Vec<StudySignal> {
        if bars.len() < self.config.min_history_bars {
            debug!(ticker, bars = bars.len(), "Skipped: insufficient history for study");
            return Vec::new();
        }

        let closes = bars.closes();
        let mut signals = Vec::new();

        for i in self.window_indices(bars.len()) {
            let window = bars.truncated(i + 1);

            let Some(rs_raw) = RsRanker::raw_score(&window).value().copied() else {
                continue;
            };

            let vcp = VcpAnalyzer::analyze(&window).into_value();
            let ses = SesAnalyzer::analyze(&window).into_value();
            let inputs = PhaseInputs {
                vcp_score: vcp.score,
                ses_score: ses.score,
                rs_raw: Some(rs_raw),
            };
            let ecr = PhaseEngine::classify_with(ticker, &window, &inputs);
            let canslim = CanslimAnalyzer::analyze(ticker, &window, None)
                .into_value_or_else(|| CanslimScore::empty_for(ticker));

            let returns: Vec<(usize, f64)> = self
                .config
                .hold_days
                .iter()
                .filter_map(|&h| forward_return(&closes, i, h).map(|r| (h, r)))
                .collect();
            if returns.is_empty() {
                continue;
            }

            let scores = WindowScores {
                vcp: vcp.score,
                rs: rs_rating_approx(rs_raw),
                ses: ses.score,
                ecr_rank: ecr.sentinel_rank,
                ecr_phase: ecr.phase,
                canslim: canslim.score,
                canslim_grade: canslim.grade,
            };
            let triggered: Vec<Method> = Method::ALL.into_iter().filter(|m| m.fires(&scores)).collect();
            if triggered.is_empty() {
                continue;
            }

            signals.push(StudySignal {
                ticker: ticker.to_string(),
                date: bars.bars()[i].date,
                scores,
                triggered,
                returns,
            });
        }

        signals
    }

    /// Fetch and evaluate every ticker, then aggregate.
    pub async fn run(&self, tickers: &[String]) -> StudyReport {
        let started = Instant::now();
        info!(
            tickers = tickers.len(),
            lookback_days = self.config.lookback_days,
            step = self.config.scan_step,
            "Starting signal study"
        );

        let lookback = self.config.lookback_days;
        let per_ticker: Vec<Vec<StudySignal>> = stream::iter(tickers.iter().cloned())
            .map(|ticker| {
                let provider = Arc::clone(&self.provider);
                async move {
                    match provider.fetch_bars(&ticker, lookback).await {
                        Ok(Some(bars)) => self.evaluate_ticker(&ticker, &bars),
                        Ok(None) => {
                            debug!(ticker = %ticker, "No bars available");
                            Vec::new()
                        }
                        Err(e) => {
                            warn!(ticker = %ticker, error = %e, "Failed to fetch bars");
                            Vec::new()
                        }
                    }
                }
            })
            .buffer_unordered(self.max_concurrency)
            .collect()
            .await;

        let mut signals: Vec<StudySignal> = per_ticker.into_iter().flatten().collect();
        signals.sort_by(|a, b| a.ticker.cmp(&b.ticker).then(a.date.cmp(&b.date)));

        let report = StudyReport::generate(&self.config, tickers.len(), &signals);
        info!(
            signals = report.signal_count,
            duration_ms = started.elapsed().as_millis() as u64,
            "Signal study complete"
        );
        report
    }
}
