//! Signal study report.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sentinel_common::StudyConfig;

use super::metrics::{BucketStats, ReturnStats};
use super::study::{Method, ScoreKey, StudySignal};
use crate::analysis::Grade;
use crate::phase::Phase;

/// Score-band edges per method: (method, key, edges). Bands are `[lo, hi)`.
const DISTRIBUTIONS: [(Method, ScoreKey, &[i32]); 5] = [
    (Method::VcpRs, ScoreKey::Vcp, &[60, 70, 80, 90, 106]),
    (Method::VcpRs, ScoreKey::Rs, &[70, 80, 90, 100]),
    (Method::Ecr, ScoreKey::EcrRank, &[65, 70, 80, 90, 101]),
    (Method::Canslim, ScoreKey::Canslim, &[50, 60, 70, 80, 101]),
    (Method::Ses, ScoreKey::Ses, &[65, 70, 80, 90, 101]),
];

const GRADED: [Grade; 4] = [Grade::APlus, Grade::A, Grade::BPlus, Grade::B];

/// Statistics for one method at one holding period.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HoldStats {
    pub hold: usize,
    pub stats: Option<ReturnStats>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MethodStats {
    pub method: Method,
    pub label: String,
    pub holds: Vec<HoldStats>,
}

impl MethodStats {
    pub fn at(&self, hold: usize) -> Option<&ReturnStats> {
        self.holds.iter().find(|h| h.hold == hold)?.stats.as_ref()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreDistribution {
    pub method: Method,
    pub key: ScoreKey,
    pub buckets: Vec<BucketStats>,
}

/// Walk-forward study output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StudyReport {
    pub generated_at: DateTime<Utc>,
    pub lookback_days: u32,
    pub hold_days: Vec<usize>,
    /// Holding period the breakdown tables use
    pub reference_hold: usize,
    pub ticker_count: usize,
    pub signal_count: usize,
    pub method_stats: Vec<MethodStats>,
    /// Methods at the reference hold, best win rate first
    pub comparison: Vec<(Method, ReturnStats)>,
    pub distributions: Vec<ScoreDistribution>,
    /// ECR signals by phase
    pub phase_stats: Vec<BucketStats>,
    /// CANSLIM signals by grade
    pub grade_stats: Vec<BucketStats>,
    /// Signals where at least N methods agreed
    pub consensus_stats: Vec<BucketStats>,
    pub signals: Vec<StudySignal>,
    pub text_report: String,
}

/// Returns of the signals where `method` fired and `hold` has a return.
fn method_returns<'a>(
    signals: &'a [StudySignal],
    method: Method,
    hold: usize,
) -> impl Iterator<Item = (&'a StudySignal, f64)> + 'a {
    signals
        .iter()
        .filter(move |s| s.fired(method))
        .filter_map(move |s| s.return_for(hold).map(|r| (s, r)))
}

/// Forward-return statistics for one method and holding period.
pub fn aggregate(signals: &[StudySignal], method: Method, hold: usize) -> Option<ReturnStats> {
    let returns: Vec<f64> = method_returns(signals, method, hold).map(|(_, r)| r).collect();
    ReturnStats::from_returns(&returns)
}

/// Win rate per score band. Empty bands are omitted.
pub fn score_distribution(
    signals: &[StudySignal],
    method: Method,
    key: ScoreKey,
    edges: &[i32],
    hold: usize,
) -> Vec<BucketStats> {
    edges
        .windows(2)
        .filter_map(|band| {
            let (lo, hi) = (band[0], band[1]);
            let returns: Vec<f64> = method_returns(signals, method, hold)
                .filter(|(s, _)| (lo..hi).contains(&key.of(&s.scores)))
                .map(|(_, r)| r)
                .collect();
            BucketStats::from_returns(format!("{lo}-{hi}"), &returns)
        })
        .collect()
}

impl StudyReport {
    pub fn generate(config: &StudyConfig, ticker_count: usize, signals: &[StudySignal]) -> Self {
        let reference_hold = reference_hold(&config.hold_days);

        let method_stats: Vec<MethodStats> = Method::ALL
            .into_iter()
            .map(|method| MethodStats {
                method,
                label: method.label().to_string(),
                holds: config
                    .hold_days
                    .iter()
                    .map(|&hold| HoldStats {
                        hold,
                        stats: aggregate(signals, method, hold),
                    })
                    .collect(),
            })
            .collect();

        let mut comparison: Vec<(Method, ReturnStats)> = method_stats
            .iter()
            .filter_map(|m| m.at(reference_hold).map(|s| (m.method, s.clone())))
            .collect();
        comparison.sort_by(|a, b| b.1.win_rate.total_cmp(&a.1.win_rate));

        let distributions = DISTRIBUTIONS
            .iter()
            .map(|&(method, key, edges)| ScoreDistribution {
                method,
                key,
                buckets: score_distribution(signals, method, key, edges, reference_hold),
            })
            .collect();

        let phase_stats = [Phase::Ignition, Phase::Accumulation]
            .into_iter()
            .filter_map(|phase| {
                let returns: Vec<f64> = method_returns(signals, Method::Ecr, reference_hold)
                    .filter(|(s, _)| s.scores.ecr_phase == phase)
                    .map(|(_, r)| r)
                    .collect();
                BucketStats::from_returns(phase.as_str(), &returns)
            })
            .collect();

        let grade_stats = GRADED
            .into_iter()
            .filter_map(|grade| {
                let returns: Vec<f64> = method_returns(signals, Method::Canslim, reference_hold)
                    .filter(|(s, _)| s.scores.canslim_grade == grade)
                    .map(|(_, r)| r)
                    .collect();
                BucketStats::from_returns(grade.to_string(), &returns)
            })
            .collect();

        let consensus_stats = (1..=Method::ALL.len())
            .filter_map(|min_methods| {
                let returns: Vec<f64> = signals
                    .iter()
                    .filter(|s| s.triggered.len() >= min_methods)
                    .filter_map(|s| s.return_for(reference_hold))
                    .collect();
                BucketStats::from_returns(format!("methods_{min_methods}plus"), &returns)
            })
            .collect();

        let mut report = Self {
            generated_at: Utc::now(),
            lookback_days: config.lookback_days,
            hold_days: config.hold_days.clone(),
            reference_hold,
            ticker_count,
            signal_count: signals.len(),
            method_stats,
            comparison,
            distributions,
            phase_stats,
            grade_stats,
            consensus_stats,
            signals: signals.to_vec(),
            text_report: String::new(),
        };
        report.text_report = report.format_text_report();
        report
    }

    fn format_text_report(&self) -> String {
        let rule = "───────────────────────────────────────────────────────────────\n";
        let mut out = String::new();

        out.push_str("═══════════════════════════════════════════════════════════════\n");
        out.push_str("                    Signal Study\n");
        out.push_str("═══════════════════════════════════════════════════════════════\n\n");
        out.push_str(&format!(
            "Tickers: {} | Signals: {} | Lookback: {}d | Reference hold: {} bars\n\n",
            self.ticker_count, self.signal_count, self.lookback_days, self.reference_hold
        ));

        out.push_str("Methods\n");
        out.push_str(rule);
        for (method, stats) in &self.comparison {
            out.push_str(&format!(
                "  {:<10} n={:<5} win {:>5.1}%  avg {:>6.2}%  PF {:>5.2}  exp {:>6.2}\n",
                method.label(),
                stats.signal_count,
                stats.win_rate,
                stats.avg_return,
                stats.profit_factor,
                stats.expectancy
            ));
        }

        if !self.consensus_stats.is_empty() {
            out.push_str("\nConsensus\n");
            out.push_str(rule);
            for bucket in &self.consensus_stats {
                out.push_str(&format!(
                    "  {:<16} n={:<5} win {:>5.1}%  avg {:>6.2}%\n",
                    bucket.label, bucket.count, bucket.win_rate, bucket.avg_return
                ));
            }
        }

        out.push_str("\n═══════════════════════════════════════════════════════════════\n");
        out
    }
}

/// The middle configured holding period (10 for the default 5/10/20).
fn reference_hold(hold_days: &[usize]) -> usize {
    let mut sorted = hold_days.to_vec();
    sorted.sort_unstable();
    sorted.get(sorted.len() / 2).copied().unwrap_or(0)
}
