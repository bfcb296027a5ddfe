//! File-backed bar store: round trip, scan and study.

mod common;

use common::{flat_series, tickers, trending_series};
use sentinel_common::{ScoringConfig, ScreenerConfig, StudyConfig};
use sentinel_scoring::backtest::SignalStudy;
use sentinel_scoring::data::{
    BarProvider, FundamentalSnapshot, FundamentalsProvider, LocalBarStore, OwnershipSnapshot,
    TickerFile,
};
use sentinel_scoring::screener::{ReportFormat, ScanStage, ScreenerEngine, ScreenerReport};
use std::sync::Arc;
use tempfile::TempDir;

async fn seeded_store() -> (TempDir, LocalBarStore) {
    let dir = tempfile::tempdir().unwrap();
    let store = LocalBarStore::new(dir.path());

    let fast = TickerFile {
        fundamentals: Some(FundamentalSnapshot {
            earnings_growth_yoy: Some(35.0),
            revenue_growth_yoy: Some(12.0),
        }),
        ownership: Some(OwnershipSnapshot {
            institutional_pct: Some(55.0),
        }),
        ..TickerFile::from_bars(trending_series(320, 20.0, 0.25))
    };
    store.save("FAST", &fast).await.unwrap();
    store
        .save("slow", &TickerFile::from_bars(trending_series(320, 20.0, 0.05)))
        .await
        .unwrap();
    store
        .save("FLAT", &TickerFile::from_bars(flat_series(320, 25.0)))
        .await
        .unwrap();

    (dir, store)
}

#[tokio::test]
async fn test_round_trip_and_listing() {
    let (_dir, store) = seeded_store().await;

    assert_eq!(store.list_tickers().await.unwrap(), tickers(&["FAST", "FLAT", "SLOW"]));

    let loaded = store.load("fast").await.unwrap().unwrap();
    assert_eq!(loaded.bars.len(), 320);
    assert_eq!(loaded.ownership.unwrap().institutional_pct, Some(55.0));

    assert!(store.income_statements("FAST").await.unwrap().is_none());
    assert_eq!(
        store.fundamentals("FAST").await.unwrap().unwrap().earnings_growth_yoy,
        Some(35.0)
    );
    assert!(store.load("MISSING").await.unwrap().is_none());
}

#[tokio::test]
async fn test_lookback_trims_old_bars() {
    let (_dir, store) = seeded_store().await;

    let bars = store.fetch_bars("FAST", 100).await.unwrap().unwrap();
    assert_eq!(bars.len(), 100);
    let full = store.fetch_bars("FAST", 700).await.unwrap().unwrap();
    assert_eq!(full.len(), 320);
}

#[tokio::test]
async fn test_scan_degrades_on_malformed_file() {
    let (dir, store) = seeded_store().await;
    std::fs::write(dir.path().join("BAD.json"), "{ not json").unwrap();

    let universe = store.list_tickers().await.unwrap();
    assert_eq!(universe.len(), 4);

    let engine = ScreenerEngine::new(ScoringConfig::default(), ScreenerConfig::default(), Arc::new(store));
    let result = engine.run_scan(&universe).await.unwrap();

    let input = &result.stage_counts[0];
    assert_eq!(input.stage, ScanStage::Input);
    assert_eq!((input.passed, input.eliminated), (3, 1));
    assert_eq!(result.entries.len(), 3);
    assert_eq!(result.entry("FAST").unwrap().scores.rs, 99);

    let report = ScreenerReport::new(result, 10);
    let path = report
        .save_to_file(&dir.path().join("reports/latest"), ReportFormat::Markdown)
        .unwrap();
    let markdown = std::fs::read_to_string(path).unwrap();
    assert!(markdown.contains("FAST"));
}

#[tokio::test]
async fn test_study_over_store() {
    let (_dir, store) = seeded_store().await;
    let study = SignalStudy::new(Arc::new(store), StudyConfig::default(), 4);

    let report = study.run(&tickers(&["FAST", "SLOW", "FLAT"])).await;

    assert_eq!(report.ticker_count, 3);
    assert!(report.signals.iter().any(|s| s.ticker == "FAST"));
    assert!(report.signals.iter().all(|s| s.ticker != "FLAT"));
    for pair in report.signals.windows(2) {
        assert!((&pair[0].ticker, pair[0].date) <= (&pair[1].ticker, pair[1].date));
    }
}
