//! Screener engine.
//!
//! Runs every analyzer over a universe of tickers in two phases separated
//! by the RS percentile barrier:
//!
//! 1. Fetch bars and compute the raw RS score for every ticker (bounded
//!    concurrency, sized to the data source rather than the CPU).
//! 2. Once every raw score is in, assign percentile ratings over the batch,
//!    then score each surviving ticker independently on the blocking pool,
//!    at most `max_concurrency` at a time.
//!
//! A ticker that fails anywhere is dropped or scored as empty; it never
//! aborts the scan.

use anyhow::Result;
use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use sentinel_common::{ScoringConfig, ScreenerConfig};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::analysis::{
    CanslimAnalyzer, CanslimScore, Grade, RawRsRecord, RsRanker, SesAnalyzer, VcpAnalyzer,
    VcpSignal,
};
use crate::backtest::StrategyValidator;
use crate::data::{BarProvider, BarSeries, FundamentalData, FundamentalsProvider};
use crate::indicators::{highest, round_to, tail};
use crate::phase::{Phase, PhaseEngine, PhaseInputs, Strategy};

/// Bars used for the status pivot.
const STATUS_PIVOT_LOOKBACK: usize = 20;

// ============================================================================
// Status Gate
// ============================================================================

/// Where price sits relative to its 20-bar high.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Status {
    /// Within 5% below to 3% above the pivot
    Action,
    /// More than 5% below the pivot
    Wait,
    /// More than 3% above the pivot
    Extended,
}

impl Status {
    /// Classify a fractional distance `(price - pivot) / pivot`.
    pub fn from_pivot_distance(dist: f64) -> Self {
        if (-0.05..=0.03).contains(&dist) {
            Self::Action
        } else if dist < -0.05 {
            Self::Wait
        } else {
            Self::Extended
        }
    }

    /// Whether the entry belongs in the rankings.
    pub fn is_actionable(&self) -> bool {
        matches!(self, Self::Action | Self::Wait)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Action => write!(f, "ACTION"),
            Self::Wait => write!(f, "WAIT"),
            Self::Extended => write!(f, "EXTENDED"),
        }
    }
}

// ============================================================================
// Scan Entries
// ============================================================================

/// Per-method scores for one ticker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreCard {
    pub vcp: i32,
    /// Cross-sectional rating, 1-99
    pub rs: u8,
    pub ses: i32,
    pub ecr_rank: i32,
    pub canslim: i32,
    /// Blended score (1 dp)
    pub composite: f64,
    /// Breakout replay profit factor
    pub pf: f64,
}

/// One scored ticker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScreenerEntry {
    pub ticker: String,
    pub status: Status,
    pub scores: ScoreCard,
    pub raw_rs: f64,
    pub ecr_phase: Phase,
    pub ecr_strategy: Strategy,
    pub canslim_grade: Grade,
    pub vcp_signals: Vec<VcpSignal>,
    /// Number of methods that rate the ticker highly, 0-4
    pub method_hits: u8,
    /// ATR as a percent of price (2 dp)
    pub atr_pct: Option<f64>,
    /// Percent distance from the 20-bar high (2 dp)
    pub pivot_dist_pct: f64,
}

/// `0.35 * min(100, vcp/105*50 + rs/99*50) + 0.35 * ecr + 0.30 * canslim`, 1 dp.
pub fn composite_score(vcp: i32, rs: u8, ecr_rank: i32, canslim: i32) -> f64 {
    let vcp_rs = (vcp as f64 / 105.0 * 50.0 + f64::from(rs) / 99.0 * 50.0).min(100.0);
    round_to(vcp_rs * 0.35 + ecr_rank as f64 * 0.35 + canslim as f64 * 0.30, 1)
}

/// Count of methods with a strong reading.
pub fn method_hits(scores: &ScoreCard) -> u8 {
    [
        scores.vcp >= 70 && scores.rs >= 80,
        scores.ecr_rank >= 70,
        scores.canslim >= 60,
        scores.ses >= 60,
    ]
    .into_iter()
    .filter(|hit| *hit)
    .count() as u8
}

/// Caller-side threshold filter. Scores are computed regardless.
pub fn passes_thresholds(entry: &ScreenerEntry, config: &ScoringConfig) -> bool {
    entry.scores.rs >= config.min_rs_rating
        && entry.scores.vcp >= config.min_vcp_score
        && entry.scores.pf >= config.min_profit_factor
}

// ============================================================================
// Scan Result
// ============================================================================

/// Pipeline stage a count refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanStage {
    /// Tickers requested, passed when bars came back
    Input,
    /// Enough bars to score
    History,
    /// Valid raw RS, so rated in the percentile stage
    Rated,
    /// Fully scored
    Scored,
}

impl fmt::Display for ScanStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Input => write!(f, "input"),
            Self::History => write!(f, "history"),
            Self::Rated => write!(f, "rated"),
            Self::Scored => write!(f, "scored"),
        }
    }
}

/// How many tickers a stage kept and dropped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageCount {
    pub stage: ScanStage,
    pub passed: usize,
    pub eliminated: usize,
    /// Percent of the stage input eliminated
    pub elimination_rate: f64,
}

impl StageCount {
    pub fn new(stage: ScanStage, input_count: usize, passed_count: usize) -> Self {
        let eliminated = input_count.saturating_sub(passed_count);
        let elimination_rate = if input_count > 0 {
            (eliminated as f64 / input_count as f64) * 100.0
        } else {
            0.0
        };

        Self {
            stage,
            passed: passed_count,
            eliminated,
            elimination_rate,
        }
    }
}

/// Result of one scan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScreenerResult {
    /// Scan ID (timestamp-based)
    pub id: String,
    /// Scored tickers, best composite first
    pub entries: Vec<ScreenerEntry>,
    pub stage_counts: Vec<StageCount>,
    pub total_scanned: usize,
    pub config_summary: String,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub duration_secs: f64,
}

impl ScreenerResult {
    /// The top `n` entries by composite.
    pub fn top(&self, n: usize) -> Vec<&ScreenerEntry> {
        self.entries.iter().take(n).collect()
    }

    pub fn by_status(&self, status: Status) -> Vec<&ScreenerEntry> {
        self.entries.iter().filter(|e| e.status == status).collect()
    }

    pub fn entry(&self, ticker: &str) -> Option<&ScreenerEntry> {
        self.entries.iter().find(|e| e.ticker.eq_ignore_ascii_case(ticker))
    }

    /// Summary string for logging.
    pub fn summary(&self) -> String {
        format!(
            "Scanned {} tickers in {:.1}s: {} scored ({:.1}%), {} ACTION, {} WAIT",
            self.total_scanned,
            self.duration_secs,
            self.entries.len(),
            if self.total_scanned > 0 {
                (self.entries.len() as f64 / self.total_scanned as f64) * 100.0
            } else {
                0.0
            },
            self.by_status(Status::Action).len(),
            self.by_status(Status::Wait).len(),
        )
    }
}

// ============================================================================
// Screener Engine
// ============================================================================

/// A ticker that made it through phase 1.
struct Candidate {
    ticker: String,
    bars: BarSeries,
    raw_rs: f64,
}

/// Phase 1 outcome with the counts the stage table needs.
struct RawScores {
    fetched: usize,
    with_history: usize,
    candidates: Vec<Candidate>,
}

/// The scan orchestrator.
pub struct ScreenerEngine<P> {
    scoring: ScoringConfig,
    screener: ScreenerConfig,
    provider: Arc<P>,
    validator: StrategyValidator,
}

impl<P> ScreenerEngine<P>
where
    P: BarProvider + FundamentalsProvider + 'static,
{
    pub fn new(scoring: ScoringConfig, screener: ScreenerConfig, provider: Arc<P>) -> Self {
        let validator = StrategyValidator::new(&scoring);
        Self {
            scoring,
            screener,
            provider,
            validator,
        }
    }

    /// Scan `tickers` (at most `max_tickers` of them).
    pub async fn run_scan(&self, tickers: &[String]) -> Result<ScreenerResult> {
        let started_at = Utc::now();
        let id = format!("scan_{}", started_at.format("%Y%m%d_%H%M%S"));
        let universe: Vec<String> = tickers.iter().take(self.screener.max_tickers).cloned().collect();

        info!(
            scan_id = %id,
            provider = self.provider.name(),
            tickers = universe.len(),
            concurrency = self.concurrency(),
            "Starting scan"
        );

        // Phase 1: fetch + raw RS
        let raw = self.collect_raw_scores(&universe).await;
        info!(
            fetched = raw.fetched,
            with_history = raw.with_history,
            ratable = raw.candidates.len(),
            "Phase 1 (raw RS) complete"
        );

        // Barrier: ratings only exist relative to the whole batch
        let records: Vec<RawRsRecord> = raw
            .candidates
            .iter()
            .map(|c| RawRsRecord::new(c.ticker.clone(), c.raw_rs))
            .collect();
        let ratings: HashMap<String, u8> = RsRanker::assign_percentiles(records)
            .into_iter()
            .map(|r| (r.ticker, r.rs_rating))
            .collect();

        // Phase 2: per-ticker scoring, CPU-bound work off the async workers
        let rated = raw.candidates.len();
        let scored: Vec<Option<ScreenerEntry>> = stream::iter(raw.candidates)
            .map(|candidate| {
                let provider = Arc::clone(&self.provider);
                let validator = self.validator.clone();
                let rating = ratings.get(&candidate.ticker).copied().unwrap_or(0);
                async move {
                    let fundamentals = provider.fundamental_data(&candidate.ticker).await;
                    let fundamentals = (!fundamentals.is_empty()).then_some(fundamentals);
                    let ticker = candidate.ticker.clone();
                    let job = tokio::task::spawn_blocking(move || {
                        score_entry(
                            &validator,
                            &candidate.ticker,
                            &candidate.bars,
                            candidate.raw_rs,
                            rating,
                            fundamentals.as_ref(),
                        )
                    });
                    match job.await {
                        Ok(entry) => Some(entry),
                        Err(e) => {
                            warn!(ticker = %ticker, error = %e, "Scoring task failed");
                            None
                        }
                    }
                }
            })
            .buffered(self.concurrency())
            .collect()
            .await;
        let mut entries: Vec<ScreenerEntry> = scored.into_iter().flatten().collect();

        entries.sort_by(|a, b| {
            b.scores
                .composite
                .total_cmp(&a.scores.composite)
                .then_with(|| a.ticker.cmp(&b.ticker))
        });

        let stage_counts = vec![
            StageCount::new(ScanStage::Input, universe.len(), raw.fetched),
            StageCount::new(ScanStage::History, raw.fetched, raw.with_history),
            StageCount::new(ScanStage::Rated, raw.with_history, rated),
            StageCount::new(ScanStage::Scored, rated, entries.len()),
        ];

        let completed_at = Utc::now();
        let duration_secs = (completed_at - started_at).num_milliseconds() as f64 / 1000.0;

        let result = ScreenerResult {
            id,
            entries,
            stage_counts,
            total_scanned: universe.len(),
            config_summary: format!(
                "stop {}xATR, target {}R, RS>={}, VCP>={}, PF>={}",
                self.scoring.stop_loss_atr,
                self.scoring.target_r_multiple,
                self.scoring.min_rs_rating,
                self.scoring.min_vcp_score,
                self.scoring.min_profit_factor
            ),
            started_at,
            completed_at,
            duration_secs,
        };

        info!(
            scan_id = %result.id,
            entries = result.entries.len(),
            duration = format!("{:.1}s", duration_secs),
            "Scan complete"
        );

        Ok(result)
    }

    /// Score one ticker given its batch rating. Pure apart from logging.
    pub fn score_ticker(
        &self,
        ticker: &str,
        bars: &BarSeries,
        raw_rs: f64,
        rs_rating: u8,
        fundamentals: Option<&FundamentalData>,
    ) -> ScreenerEntry {
        score_entry(&self.validator, ticker, bars, raw_rs, rs_rating, fundamentals)
    }

    fn concurrency(&self) -> usize {
        self.screener.max_concurrency.max(1)
    }

    async fn collect_raw_scores(&self, tickers: &[String]) -> RawScores {
        let lookback = self.screener.lookback_days;
        let min_history = self.screener.min_history_bars;

        let fetched: Vec<Option<(String, BarSeries)>> = stream::iter(tickers.iter().cloned())
            .map(|ticker| {
                let provider = Arc::clone(&self.provider);
                async move {
                    match provider.fetch_bars(&ticker, lookback).await {
                        Ok(Some(bars)) if !bars.is_empty() => Some((ticker, bars)),
                        Ok(_) => {
                            debug!(ticker = %ticker, "No bars available");
                            None
                        }
                        Err(e) => {
                            warn!(ticker = %ticker, error = %e, "Failed to fetch bars");
                            None
                        }
                    }
                }
            })
            .buffered(self.concurrency())
            .collect()
            .await;

        let fetched: Vec<(String, BarSeries)> = fetched.into_iter().flatten().collect();
        let fetched_count = fetched.len();

        let with_history: Vec<(String, BarSeries)> = fetched
            .into_iter()
            .filter(|(ticker, bars)| {
                let enough = bars.len() >= min_history;
                if !enough {
                    debug!(ticker = %ticker, bars = bars.len(), min_history, "Skipped: insufficient history");
                }
                enough
            })
            .collect();
        let with_history_count = with_history.len();

        let candidates = with_history
            .into_iter()
            .filter_map(|(ticker, bars)| match RsRanker::raw_score(&bars).value().copied() {
                Some(raw_rs) => Some(Candidate { ticker, bars, raw_rs }),
                None => {
                    debug!(ticker = %ticker, "Skipped: invalid raw RS");
                    None
                }
            })
            .collect();

        RawScores {
            fetched: fetched_count,
            with_history: with_history_count,
            candidates,
        }
    }
}

/// Every per-ticker analyzer over one series. CPU-bound, no I/O.
fn score_entry(
    validator: &StrategyValidator,
    ticker: &str,
    bars: &BarSeries,
    raw_rs: f64,
    rs_rating: u8,
    fundamentals: Option<&FundamentalData>,
) -> ScreenerEntry {
    let vcp = VcpAnalyzer::analyze(bars).into_value();
    let pf = validator.profit_factor(bars);
    let ses = SesAnalyzer::analyze(bars).into_value();
    let inputs = PhaseInputs {
        vcp_score: vcp.score,
        ses_score: ses.score,
        rs_raw: Some(raw_rs),
    };
    let ecr = PhaseEngine::classify_with(ticker, bars, &inputs);
    let canslim = CanslimAnalyzer::analyze(ticker, bars, fundamentals)
        .into_value_or_else(|| CanslimScore::empty_for(ticker));

    let price = bars.last_close().unwrap_or(0.0);
    let pivot = highest(tail(&bars.highs(), STATUS_PIVOT_LOOKBACK)).unwrap_or(price);
    let dist = if pivot > 0.0 { (price - pivot) / pivot } else { 0.0 };

    let scores = ScoreCard {
        vcp: vcp.score,
        rs: rs_rating,
        ses: ses.score,
        ecr_rank: ecr.sentinel_rank,
        canslim: canslim.score,
        composite: composite_score(vcp.score, rs_rating, ecr.sentinel_rank, canslim.score),
        pf: round_to(pf, 2),
    };
    let hits = method_hits(&scores);

    debug!(
        ticker,
        vcp = scores.vcp,
        rs = scores.rs,
        ecr = scores.ecr_rank,
        canslim = scores.canslim,
        phase = %ecr.phase,
        "Ticker scored"
    );

    ScreenerEntry {
        ticker: ticker.to_string(),
        status: Status::from_pivot_distance(dist),
        scores,
        raw_rs,
        ecr_phase: ecr.phase,
        ecr_strategy: ecr.strategy,
        canslim_grade: canslim.grade,
        vcp_signals: vcp.signals,
        method_hits: hits,
        atr_pct: (price > 0.0).then(|| round_to(vcp.atr / price * 100.0, 2)),
        pivot_dist_pct: round_to(dist * 100.0, 2),
    }
}
