//! Report generation for scan results.
//!
//! Builds the per-method rankings, the ECR phase summary and the method
//! comparison table, and renders them as:
//! - Markdown (for reading)
//! - JSON (for downstream tooling)

use anyhow::{Context, Result};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use super::engine::{ScreenerEntry, ScreenerResult, Status};
use crate::indicators::round_to;
use crate::phase::{Phase, Strategy};

/// Members listed per phase.
const PHASE_SUMMARY_LIMIT: usize = 15;
/// Entries per method in the comparison table.
const COMPARISON_LIMIT: usize = 20;

// ============================================================================
// Report Format
// ============================================================================

/// Supported report formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReportFormat {
    /// Markdown format (human-readable)
    Markdown,
    /// JSON format (machine-readable)
    Json,
}

impl std::fmt::Display for ReportFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Markdown => write!(f, "markdown"),
            Self::Json => write!(f, "json"),
        }
    }
}

impl std::str::FromStr for ReportFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "markdown" | "md" => Ok(Self::Markdown),
            "json" => Ok(Self::Json),
            _ => Err(format!("Unknown report format: {}", s)),
        }
    }
}

// ============================================================================
// Report Sections
// ============================================================================

/// Ranking key for one selection method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RankingMethod {
    VcpRs,
    Ecr,
    Canslim,
    Ses,
}

impl RankingMethod {
    pub const ALL: [RankingMethod; 4] = [Self::VcpRs, Self::Ecr, Self::Canslim, Self::Ses];

    pub fn label(&self) -> &'static str {
        match self {
            Self::VcpRs => "VCP x RS",
            Self::Ecr => "ECR",
            Self::Canslim => "CANSLIM",
            Self::Ses => "SES",
        }
    }

    pub fn key(&self, entry: &ScreenerEntry) -> f64 {
        let s = &entry.scores;
        match self {
            Self::VcpRs => s.vcp as f64 * 0.5 + f64::from(s.rs) * 0.5,
            Self::Ecr => s.ecr_rank as f64,
            Self::Canslim => s.canslim as f64,
            Self::Ses => s.ses as f64,
        }
    }
}

/// Top entries per method, over ACTION and WAIT entries only.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Rankings {
    pub vcp_rs: Vec<ScreenerEntry>,
    pub ecr: Vec<ScreenerEntry>,
    pub canslim: Vec<ScreenerEntry>,
    pub ses: Vec<ScreenerEntry>,
    pub composite: Vec<ScreenerEntry>,
    /// Most methods in agreement, then composite
    pub consensus: Vec<ScreenerEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseMember {
    pub ticker: String,
    pub ecr_rank: i32,
    pub strategy: Strategy,
    pub vcp: i32,
    pub rs: u8,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AverageScores {
    pub vcp: f64,
    pub ecr: f64,
    pub canslim: f64,
    pub ses: f64,
}

/// How a method's top picks score under the other methods.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MethodComparison {
    pub method: RankingMethod,
    pub label: String,
    pub top_tickers: Vec<String>,
    pub avg_scores: AverageScores,
}

/// Sort descending by `key`, ties by ticker, keep `n`.
fn top_by(entries: &[&ScreenerEntry], n: usize, key: impl Fn(&ScreenerEntry) -> f64) -> Vec<ScreenerEntry> {
    let mut sorted: Vec<&ScreenerEntry> = entries.to_vec();
    sorted.sort_by(|a, b| key(b).total_cmp(&key(a)).then_with(|| a.ticker.cmp(&b.ticker)));
    sorted.into_iter().take(n).cloned().collect()
}

pub fn build_rankings(entries: &[ScreenerEntry], n: usize) -> Rankings {
    let valid: Vec<&ScreenerEntry> = entries.iter().filter(|e| e.status.is_actionable()).collect();

    let mut consensus = valid.clone();
    consensus.sort_by(|a, b| {
        b.method_hits
            .cmp(&a.method_hits)
            .then_with(|| b.scores.composite.total_cmp(&a.scores.composite))
            .then_with(|| a.ticker.cmp(&b.ticker))
    });

    Rankings {
        vcp_rs: top_by(&valid, n, |e| RankingMethod::VcpRs.key(e)),
        ecr: top_by(&valid, n, |e| RankingMethod::Ecr.key(e)),
        canslim: top_by(&valid, n, |e| RankingMethod::Canslim.key(e)),
        ses: top_by(&valid, n, |e| RankingMethod::Ses.key(e)),
        composite: top_by(&valid, n, |e| e.scores.composite),
        consensus: consensus.into_iter().take(n).cloned().collect(),
    }
}

/// Entries grouped by phase, highest rank first.
pub fn build_phase_summary(entries: &[ScreenerEntry]) -> BTreeMap<Phase, Vec<PhaseMember>> {
    let mut phases: BTreeMap<Phase, Vec<PhaseMember>> = BTreeMap::new();
    for e in entries {
        phases.entry(e.ecr_phase).or_default().push(PhaseMember {
            ticker: e.ticker.clone(),
            ecr_rank: e.scores.ecr_rank,
            strategy: e.ecr_strategy,
            vcp: e.scores.vcp,
            rs: e.scores.rs,
        });
    }
    for members in phases.values_mut() {
        members.sort_by(|a, b| b.ecr_rank.cmp(&a.ecr_rank).then_with(|| a.ticker.cmp(&b.ticker)));
        members.truncate(PHASE_SUMMARY_LIMIT);
    }
    phases
}

/// Each method's top 20 over all entries, with average scores across methods.
pub fn build_method_comparison(entries: &[ScreenerEntry]) -> Vec<MethodComparison> {
    let all: Vec<&ScreenerEntry> = entries.iter().collect();

    RankingMethod::ALL
        .into_iter()
        .map(|method| {
            let top = top_by(&all, COMPARISON_LIMIT, |e| method.key(e));
            let avg = |f: fn(&ScreenerEntry) -> f64| {
                if top.is_empty() {
                    0.0
                } else {
                    round_to(top.iter().map(f).sum::<f64>() / top.len() as f64, 1)
                }
            };

            MethodComparison {
                method,
                label: method.label().to_string(),
                top_tickers: top.iter().map(|e| e.ticker.clone()).collect(),
                avg_scores: AverageScores {
                    vcp: avg(|e| e.scores.vcp as f64),
                    ecr: avg(|e| e.scores.ecr_rank as f64),
                    canslim: avg(|e| e.scores.canslim as f64),
                    ses: avg(|e| e.scores.ses as f64),
                },
            }
        })
        .collect()
}

// ============================================================================
// Screener Report
// ============================================================================

/// Full report over one scan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScreenerReport {
    pub result: ScreenerResult,
    pub ticker_count: usize,
    pub action_count: usize,
    pub wait_count: usize,
    pub rankings: Rankings,
    pub ecr_phases: BTreeMap<Phase, Vec<PhaseMember>>,
    pub method_comparison: Vec<MethodComparison>,
}

impl ScreenerReport {
    /// Build every section; rankings keep `top_n` entries each.
    pub fn new(result: ScreenerResult, top_n: usize) -> Self {
        let entries = &result.entries;
        Self {
            ticker_count: entries.len(),
            action_count: entries.iter().filter(|e| e.status == Status::Action).count(),
            wait_count: entries.iter().filter(|e| e.status == Status::Wait).count(),
            rankings: build_rankings(entries, top_n),
            ecr_phases: build_phase_summary(entries),
            method_comparison: build_method_comparison(entries),
            result,
        }
    }

    /// Generate report in the specified format.
    pub fn generate(&self, format: ReportFormat) -> String {
        match format {
            ReportFormat::Markdown => self.to_markdown(),
            ReportFormat::Json => self.to_json(),
        }
    }

    /// Save report to file.
    pub fn save_to_file(&self, path: &Path, format: ReportFormat) -> Result<PathBuf> {
        let content = self.generate(format);
        let extension = match format {
            ReportFormat::Markdown => "md",
            ReportFormat::Json => "json",
        };

        let file_path = if path.extension().is_none() {
            path.with_extension(extension)
        } else {
            path.to_path_buf()
        };

        if let Some(parent) = file_path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create report directory")?;
        }

        std::fs::write(&file_path, content).context("Failed to write report file")?;

        Ok(file_path)
    }

    /// Generate markdown report.
    pub fn to_markdown(&self) -> String {
        let mut md = String::new();

        md.push_str(&format!(
            "# Scan Report\n\n**Scan ID**: {}\n**Completed**: {}\n**Duration**: {:.1}s\n\n",
            self.result.id,
            self.result.completed_at.format("%Y-%m-%d %H:%M:%S"),
            self.result.duration_secs
        ));

        md.push_str("## Summary\n\n");
        md.push_str(&format!("- **Scanned**: {} tickers\n", self.result.total_scanned));
        md.push_str(&format!("- **Scored**: {} tickers\n", self.ticker_count));
        md.push_str(&format!("- **ACTION / WAIT**: {} / {}\n", self.action_count, self.wait_count));
        md.push_str(&format!("- **Settings**: {}\n\n", self.result.config_summary));

        md.push_str("### Pipeline\n\n");
        md.push_str("| Stage | Passed | Dropped | Drop rate |\n");
        md.push_str("|-------|--------|---------|-----------|\n");
        for stage in &self.result.stage_counts {
            md.push_str(&format!(
                "| {} | {} | {} | {:.1}% |\n",
                stage.stage, stage.passed, stage.eliminated, stage.elimination_rate
            ));
        }
        md.push('\n');

        md.push_str("## Consensus\n\n");
        md.push_str("| Ticker | Status | Hits | Composite | VCP | RS | ECR | CANSLIM | SES | Phase |\n");
        md.push_str("|--------|--------|------|-----------|-----|----|-----|---------|-----|-------|\n");
        for e in &self.rankings.consensus {
            md.push_str(&format!(
                "| {} | {} | {} | {:.1} | {} | {} | {} | {} ({}) | {} | {} |\n",
                e.ticker,
                e.status,
                e.method_hits,
                e.scores.composite,
                e.scores.vcp,
                e.scores.rs,
                e.scores.ecr_rank,
                e.scores.canslim,
                e.canslim_grade,
                e.scores.ses,
                e.ecr_phase,
            ));
        }
        md.push('\n');

        if !self.ecr_phases.is_empty() {
            md.push_str("## ECR Phases\n\n");
            for (phase, members) in &self.ecr_phases {
                let tickers: Vec<&str> = members.iter().map(|m| m.ticker.as_str()).collect();
                md.push_str(&format!("- **{}** ({}): {}\n", phase, members.len(), tickers.join(", ")));
            }
            md.push('\n');
        }

        md.push_str("## Method Comparison\n\n");
        md.push_str("| Method | Avg VCP | Avg ECR | Avg CANSLIM | Avg SES |\n");
        md.push_str("|--------|---------|---------|-------------|---------|\n");
        for m in &self.method_comparison {
            md.push_str(&format!(
                "| {} | {:.1} | {:.1} | {:.1} | {:.1} |\n",
                m.label, m.avg_scores.vcp, m.avg_scores.ecr, m.avg_scores.canslim, m.avg_scores.ses
            ));
        }
        md.push('\n');

        md.push_str("---\n\n");
        md.push_str(&format!(
            "*Generated {} UTC*\n",
            Utc::now().format("%Y-%m-%d %H:%M:%S")
        ));

        md
    }

    /// Generate JSON report.
    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_else(|_| "{}".to_string())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::Grade;
    use crate::screener::engine::{ScanStage, ScoreCard, StageCount};

    fn entry(ticker: &str, status: Status, vcp: i32, rs: u8, ecr: i32, canslim: i32, hits: u8) -> ScreenerEntry {
        ScreenerEntry {
            ticker: ticker.to_string(),
            status,
            scores: ScoreCard {
                vcp,
                rs,
                ses: 40,
                ecr_rank: ecr,
                canslim,
                composite: crate::screener::composite_score(vcp, rs, ecr, canslim),
                pf: 1.5,
            },
            raw_rs: 0.2,
            ecr_phase: if ecr >= 65 { Phase::HoldWatch } else { Phase::Watch },
            ecr_strategy: Strategy::None,
            canslim_grade: Grade::from_score(canslim),
            vcp_signals: Vec::new(),
            method_hits: hits,
            atr_pct: Some(2.1),
            pivot_dist_pct: -1.5,
        }
    }

    fn create_test_result() -> ScreenerResult {
        ScreenerResult {
            id: "scan_test".to_string(),
            entries: vec![
                entry("AAA", Status::Action, 90, 95, 80, 70, 3),
                entry("BBB", Status::Wait, 60, 70, 50, 40, 0),
                entry("CCC", Status::Extended, 100, 99, 95, 90, 4),
                entry("DDD", Status::Action, 40, 80, 66, 85, 1),
            ],
            stage_counts: vec![
                StageCount::new(ScanStage::Input, 5, 4),
                StageCount::new(ScanStage::History, 4, 4),
            ],
            total_scanned: 5,
            config_summary: "stop 2xATR".to_string(),
            started_at: Utc::now(),
            completed_at: Utc::now(),
            duration_secs: 1.5,
        }
    }

    #[test]
    fn test_rankings_exclude_extended() {
        let rankings = build_rankings(&create_test_result().entries, 20);

        assert!(rankings.composite.iter().all(|e| e.ticker != "CCC"));
        assert_eq!(rankings.ecr[0].ticker, "AAA");
        assert_eq!(rankings.canslim[0].ticker, "DDD");
        let consensus: Vec<&str> = rankings.consensus.iter().map(|e| e.ticker.as_str()).collect();
        assert_eq!(consensus, vec!["AAA", "DDD", "BBB"]);
    }

    #[test]
    fn test_rankings_respect_limit() {
        let rankings = build_rankings(&create_test_result().entries, 1);
        assert_eq!(rankings.vcp_rs.len(), 1);
        assert_eq!(rankings.vcp_rs[0].ticker, "AAA");
    }

    #[test]
    fn test_phase_summary_sorted_by_rank() {
        let phases = build_phase_summary(&create_test_result().entries);
        let hold: Vec<&str> = phases[&Phase::HoldWatch].iter().map(|m| m.ticker.as_str()).collect();
        assert_eq!(hold, vec!["CCC", "AAA", "DDD"]);
        assert_eq!(phases[&Phase::Watch].len(), 1);
    }

    #[test]
    fn test_method_comparison_averages_over_taken() {
        let comparison = build_method_comparison(&create_test_result().entries);
        assert_eq!(comparison.len(), 4);
        let ses = comparison.iter().find(|m| m.method == RankingMethod::Ses).unwrap();
        assert_eq!(ses.top_tickers.len(), 4);
        assert_eq!(ses.avg_scores.ses, 40.0);
        // (90 + 60 + 100 + 40) / 4
        assert_eq!(ses.avg_scores.vcp, 72.5);
    }

    #[test]
    fn test_counts_and_markdown() {
        let report = ScreenerReport::new(create_test_result(), 20);
        assert_eq!(report.action_count, 2);
        assert_eq!(report.wait_count, 1);

        let md = report.to_markdown();
        assert!(md.contains("# Scan Report"));
        assert!(md.contains("AAA"));
        assert!(md.contains("HOLD/WATCH"));
        assert!(md.contains("| input | 4 | 1 |"));
    }

    #[test]
    fn test_json_generation() {
        let report = ScreenerReport::new(create_test_result(), 20);
        let json: serde_json::Value = serde_json::from_str(&report.to_json()).unwrap();

        assert_eq!(json["action_count"], 2);
        assert_eq!(json["result"]["id"], "scan_test");
        assert!(json["ecr_phases"]["HOLD/WATCH"].is_array());
        assert_eq!(json["rankings"]["consensus"][0]["status"], "ACTION");
    }

    #[test]
    fn test_save_to_file_adds_extension() {
        let dir = tempfile::tempdir().unwrap();
        let report = ScreenerReport::new(create_test_result(), 20);
        let path = report.save_to_file(&dir.path().join("out/scan"), ReportFormat::Json).unwrap();
        assert_eq!(path.extension().unwrap(), "json");
        assert!(path.exists());
    }

    #[test]
    fn test_report_format_parsing() {
        assert_eq!("md".parse::<ReportFormat>().unwrap(), ReportFormat::Markdown);
        assert_eq!("JSON".parse::<ReportFormat>().unwrap(), ReportFormat::Json);
        assert!("pdf".parse::<ReportFormat>().is_err());
    }
}
