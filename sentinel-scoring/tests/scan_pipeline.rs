//! End-to-end scan over an in-memory universe.

mod common;

use common::{flat_series, tickers, trending_series};
use sentinel_common::{ScoringConfig, ScreenerConfig};
use sentinel_scoring::data::{IncomeStatement, InMemoryProvider, OwnershipSnapshot, TickerFile};
use sentinel_scoring::phase::Phase;
use sentinel_scoring::screener::{ScanStage, ScreenerEngine, ScreenerReport};
use std::sync::Arc;

fn universe() -> InMemoryProvider {
    InMemoryProvider::new()
        .with_bars("FAST", trending_series(300, 20.0, 0.3))
        .with_bars("SLOW", trending_series(300, 20.0, 0.05))
        .with_bars("FLAT", flat_series(300, 30.0))
        .with_bars("YOUNG", trending_series(150, 20.0, 0.2))
}

fn engine(provider: InMemoryProvider) -> ScreenerEngine<InMemoryProvider> {
    ScreenerEngine::new(ScoringConfig::default(), ScreenerConfig::default(), Arc::new(provider))
}

#[tokio::test]
async fn test_scan_to_report() {
    let result = engine(universe())
        .run_scan(&tickers(&["FAST", "SLOW", "FLAT", "YOUNG"]))
        .await
        .unwrap();

    assert_eq!(result.total_scanned, 4);
    assert_eq!(result.entries.len(), 3);
    let scored = result
        .stage_counts
        .iter()
        .find(|s| s.stage == ScanStage::Scored)
        .unwrap();
    assert_eq!(scored.passed, 3);

    // Best composite first
    for pair in result.entries.windows(2) {
        assert!(pair[0].scores.composite >= pair[1].scores.composite);
    }

    for entry in &result.entries {
        assert!((1..=99).contains(&entry.scores.rs));
        assert!((0..=105).contains(&entry.scores.vcp));
        assert!((0..=100).contains(&entry.scores.ecr_rank));
        assert!((0..=100).contains(&entry.scores.canslim));
        assert!(entry.scores.pf >= 0.0 && entry.scores.pf <= 10.0);
        assert_ne!(entry.ecr_phase, Phase::Error);
    }

    let report = ScreenerReport::new(result, 2);
    assert_eq!(report.ticker_count, 3);
    assert!(report.action_count + report.wait_count <= 3);
    assert!(report.rankings.composite.len() <= 2);
    assert!(report.rankings.consensus.iter().all(|e| e.status.is_actionable()));
    assert_eq!(report.method_comparison.len(), 4);

    let json: serde_json::Value = serde_json::from_str(&report.to_json()).unwrap();
    assert_eq!(json["ticker_count"], 3);
    assert!(json["result"]["entries"].is_array());
}

#[tokio::test]
async fn test_fundamentals_raise_canslim() {
    let bare = engine(universe())
        .run_scan(&tickers(&["FAST", "SLOW", "FLAT"]))
        .await
        .unwrap();

    let mut provider = universe();
    provider.insert(
        "FAST",
        TickerFile {
            bars: trending_series(300, 20.0, 0.3),
            statements: vec![
                IncomeStatement {
                    eps: Some(2.0),
                    revenue: Some(150.0),
                    ..Default::default()
                },
                IncomeStatement {
                    eps: Some(1.0),
                    revenue: Some(100.0),
                    ..Default::default()
                },
            ],
            fundamentals: None,
            ownership: Some(OwnershipSnapshot {
                institutional_pct: Some(75.0),
            }),
        },
    );
    let enriched = engine(provider)
        .run_scan(&tickers(&["FAST", "SLOW", "FLAT"]))
        .await
        .unwrap();

    let before = bare.entry("FAST").unwrap();
    let after = enriched.entry("FAST").unwrap();
    assert!(after.scores.canslim > before.scores.canslim);
    // Ratings depend only on price history
    assert_eq!(after.scores.rs, before.scores.rs);
    assert_eq!(after.scores.vcp, before.scores.vcp);
}

#[tokio::test]
async fn test_max_tickers_caps_universe() {
    let screener = ScreenerConfig {
        max_tickers: 2,
        ..ScreenerConfig::default()
    };
    let engine = ScreenerEngine::new(ScoringConfig::default(), screener, Arc::new(universe()));
    let result = engine
        .run_scan(&tickers(&["FAST", "SLOW", "FLAT"]))
        .await
        .unwrap();

    assert_eq!(result.total_scanned, 2);
    assert!(result.entry("FLAT").is_none());
    // Two rated tickers: 50 and 99
    assert_eq!(result.entry("SLOW").unwrap().scores.rs, 50);
    assert_eq!(result.entry("FAST").unwrap().scores.rs, 99);
}
