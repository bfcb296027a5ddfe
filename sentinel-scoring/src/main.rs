//! Sentinel Scoring - batch scan and walk-forward study over a local bar store.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use sentinel_common::config::Config;
use sentinel_common::logging::init_from_config;
use sentinel_common::{exit_code_for, Error};
use sentinel_scoring::backtest::SignalStudy;
use sentinel_scoring::data::{BarProvider, LocalBarStore};
use sentinel_scoring::screener::{ReportFormat, ScreenerEngine, ScreenerReport};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(name = "sentinel-scoring")]
#[command(version, about = "Signal scoring and cross-sectional ranking", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Bar store directory (overrides screener.data_dir)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Report destination (overrides screener.output_path)
    #[arg(short, long, global = true)]
    output: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Score and rank a universe
    Scan {
        /// Tickers to scan (every ticker in the store when omitted)
        tickers: Vec<String>,

        /// Report format: json or markdown
        #[arg(long, default_value = "json")]
        format: ReportFormat,
    },
    /// Replay signals over history and measure forward returns
    Study {
        /// Tickers to study (every ticker in the store when omitted)
        tickers: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::from(u8::try_from(exit_code_for(&e)).unwrap_or(1))
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let startup_start = std::time::Instant::now();

    let mut config = Config::load_with_env()
        .map_err(|e| Error::Config(format!("{e:#}")))
        .context("Failed to load configuration")?;
    if let Some(dir) = &cli.data_dir {
        config.screener.data_dir = dir.to_string_lossy().into_owned();
    }
    if let Some(path) = &cli.output {
        config.screener.output_path = Some(path.to_string_lossy().into_owned());
    }
    config
        .validate()
        .map_err(Error::from)
        .context("Invalid configuration")?;

    init_from_config(&config.observability);
    tracing::info!("Sentinel Scoring v{}", env!("CARGO_PKG_VERSION"));

    let store = Arc::new(LocalBarStore::new(&config.screener.data_dir));

    match cli.command {
        Commands::Scan { tickers, format } => {
            let universe = resolve_universe(store.as_ref(), tickers, config.screener.max_tickers).await?;
            let engine = ScreenerEngine::new(config.scoring.clone(), config.screener.clone(), Arc::clone(&store));
            let result = engine.run_scan(&universe).await?;
            tracing::info!("{}", result.summary());

            let report = ScreenerReport::new(result, config.screener.top_n);
            emit(&config, report.generate(format))?;
        }
        Commands::Study { tickers } => {
            let universe = resolve_universe(store.as_ref(), tickers, config.screener.max_tickers).await?;
            let study = SignalStudy::new(Arc::clone(&store), config.study.clone(), config.screener.max_concurrency);
            let report = study.run(&universe).await;
            tracing::info!(
                tickers = report.ticker_count,
                signals = report.signal_count,
                "Signal study complete"
            );
            eprintln!("{}", report.text_report);

            let json = serde_json::to_string_pretty(&report).context("Failed to serialize study report")?;
            emit(&config, json)?;
        }
    }

    tracing::info!(
        duration_ms = startup_start.elapsed().as_millis() as u64,
        "Done"
    );
    Ok(())
}

/// Explicit tickers, else everything the store holds, capped at `max`.
///
/// An empty universe is a `NotFound` error.
async fn resolve_universe(store: &LocalBarStore, tickers: Vec<String>, max: usize) -> Result<Vec<String>> {
    let mut universe = if tickers.is_empty() {
        store
            .list_tickers()
            .await
            .with_context(|| format!("Failed to list tickers in {}", store.root().display()))?
    } else {
        tickers.into_iter().map(|t| t.trim().to_uppercase()).collect()
    };
    universe.truncate(max);

    if universe.is_empty() {
        return Err(Error::NotFound(format!("no tickers in {}", store.root().display())).into());
    }
    Ok(universe)
}

/// Write the report to the configured path, or stdout.
fn emit(config: &Config, content: String) -> Result<()> {
    match &config.screener.output_path {
        Some(path) => {
            let path = PathBuf::from(path);
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create {}", parent.display()))?;
            }
            std::fs::write(&path, content)
                .with_context(|| format!("Failed to write report to {}", path.display()))?;
            tracing::info!(path = %path.display(), "Report written");
        }
        None => println!("{content}"),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use sentinel_scoring::data::TickerFile;

    #[tokio::test]
    async fn test_empty_store_exits_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalBarStore::new(dir.path().join("absent"));

        let err = resolve_universe(&store, Vec::new(), 10).await.unwrap_err();
        assert_eq!(exit_code_for(&err), 66);
    }

    #[tokio::test]
    async fn test_universe_normalizes_and_caps() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalBarStore::new(dir.path());
        for ticker in ["AAA", "BBB", "CCC"] {
            store.save(ticker, &TickerFile::default()).await.unwrap();
        }

        let listed = resolve_universe(&store, Vec::new(), 2).await.unwrap();
        assert_eq!(listed, vec!["AAA".to_string(), "BBB".to_string()]);

        let explicit = resolve_universe(&store, vec![" msft ".into()], 10).await.unwrap();
        assert_eq!(explicit, vec!["MSFT".to_string()]);
    }
}
