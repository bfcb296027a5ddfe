//! File-backed and in-memory data sources.
//!
//! The local store is a directory holding one `<TICKER>.json` file per
//! security. Bars are required; statements and snapshots are optional.

use anyhow::Result;
use async_trait::async_trait;
use chrono::Duration;
use sentinel_common::ResultExt;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

use super::provider::{
    BarProvider, FundamentalSnapshot, FundamentalsProvider, IncomeStatement, OwnershipSnapshot,
};
use super::BarSeries;

/// On-disk layout of one ticker file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TickerFile {
    pub bars: BarSeries,
    /// Annual statements, most recent first
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub statements: Vec<IncomeStatement>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fundamentals: Option<FundamentalSnapshot>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ownership: Option<OwnershipSnapshot>,
}

impl TickerFile {
    pub fn from_bars(bars: BarSeries) -> Self {
        Self {
            bars,
            ..Default::default()
        }
    }
}

/// Keep the bars dated within `lookback_days` calendar days of the latest bar.
fn trim_to_lookback(mut series: BarSeries, lookback_days: u32) -> BarSeries {
    let Some(last) = series.last().map(|b| b.date) else {
        return series;
    };
    let cutoff = last - Duration::days(i64::from(lookback_days));
    let keep = series.bars().iter().filter(|b| b.date > cutoff).count();
    series.keep_last(keep);
    series
}

fn normalize(ticker: &str) -> String {
    ticker.trim().to_uppercase()
}

// ============================================================================
// Local Bar Store
// ============================================================================

/// Directory of per-ticker JSON files.
///
/// Provider calls parse each file once and share the parsed file across
/// the bar and fundamentals lookups. Clones share the cache. `save`
/// refreshes the cached entry; edits made to the files behind the store's
/// back are not picked up.
#[derive(Debug, Clone)]
pub struct LocalBarStore {
    root: PathBuf,
    /// Parsed files by normalized ticker; `None` records a missing file
    cache: Arc<RwLock<HashMap<String, Option<Arc<TickerFile>>>>>,
}

impl LocalBarStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            cache: Arc::default(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, ticker: &str) -> PathBuf {
        self.root.join(format!("{}.json", normalize(ticker)))
    }

    /// Read a ticker file from disk. `Ok(None)` when the file does not exist.
    pub async fn load(&self, ticker: &str) -> Result<Option<TickerFile>> {
        let path = self.path_for(ticker);
        let content = match tokio::fs::read_to_string(&path)
            .await
            .context(format!("Failed to read {}", path.display()))
        {
            Ok(content) => content,
            Err(e) if e.is_not_found() => {
                debug!(ticker, path = %path.display(), "No local data");
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };

        let file = serde_json::from_str(&content).context(format!("Failed to parse {}", path.display()))?;
        Ok(Some(file))
    }

    /// Write a ticker file, creating the store directory when needed.
    pub async fn save(&self, ticker: &str, file: &TickerFile) -> Result<()> {
        tokio::fs::create_dir_all(&self.root)
            .await
            .context(format!("Failed to create store directory {}", self.root.display()))?;

        let path = self.path_for(ticker);
        let content = serde_json::to_string(file).context(format!("Failed to serialize {ticker}"))?;
        tokio::fs::write(&path, content)
            .await
            .context(format!("Failed to write {}", path.display()))?;

        self.cache
            .write()
            .await
            .insert(normalize(ticker), Some(Arc::new(file.clone())));
        Ok(())
    }

    /// The parsed ticker file, read from disk on first use only.
    ///
    /// Read errors are not cached, so a later call retries.
    async fn cached(&self, ticker: &str) -> Result<Option<Arc<TickerFile>>> {
        let key = normalize(ticker);
        if let Some(entry) = self.cache.read().await.get(&key) {
            return Ok(entry.clone());
        }

        let entry = self.load(&key).await?.map(Arc::new);
        self.cache.write().await.insert(key, entry.clone());
        Ok(entry)
    }
}

#[async_trait]
impl BarProvider for LocalBarStore {
    fn name(&self) -> &str {
        "local"
    }

    async fn fetch_bars(&self, ticker: &str, lookback_days: u32) -> Result<Option<BarSeries>> {
        Ok(self
            .cached(ticker)
            .await?
            .map(|file| trim_to_lookback(file.bars.clone(), lookback_days)))
    }

    async fn list_tickers(&self) -> Result<Vec<String>> {
        let listing = format!("Failed to list {}", self.root.display());
        let mut entries = match tokio::fs::read_dir(&self.root).await.context(listing.as_str()) {
            Ok(entries) => entries,
            Err(e) if e.is_not_found() => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut tickers = Vec::new();
        while let Some(entry) = entries.next_entry().await.context(listing.as_str())? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                tickers.push(stem.to_string());
            }
        }
        tickers.sort();
        Ok(tickers)
    }
}

#[async_trait]
impl FundamentalsProvider for LocalBarStore {
    async fn income_statements(&self, ticker: &str) -> Result<Option<Vec<IncomeStatement>>> {
        Ok(self
            .cached(ticker)
            .await?
            .map(|f| f.statements.clone())
            .filter(|s| !s.is_empty()))
    }

    async fn fundamentals(&self, ticker: &str) -> Result<Option<FundamentalSnapshot>> {
        Ok(self.cached(ticker).await?.and_then(|f| f.fundamentals.clone()))
    }

    async fn ownership(&self, ticker: &str) -> Result<Option<OwnershipSnapshot>> {
        Ok(self.cached(ticker).await?.and_then(|f| f.ownership.clone()))
    }
}

// ============================================================================
// In-Memory Provider
// ============================================================================

/// Preloaded ticker data.
#[derive(Debug, Clone, Default)]
pub struct InMemoryProvider {
    files: HashMap<String, TickerFile>,
}

impl InMemoryProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add bars for a ticker (builder style).
    pub fn with_bars(mut self, ticker: &str, bars: BarSeries) -> Self {
        self.insert(ticker, TickerFile::from_bars(bars));
        self
    }

    pub fn insert(&mut self, ticker: &str, file: TickerFile) {
        self.files.insert(normalize(ticker), file);
    }
}

#[async_trait]
impl BarProvider for InMemoryProvider {
    fn name(&self) -> &str {
        "memory"
    }

    async fn fetch_bars(&self, ticker: &str, lookback_days: u32) -> Result<Option<BarSeries>> {
        Ok(self
            .files
            .get(&normalize(ticker))
            .map(|f| trim_to_lookback(f.bars.clone(), lookback_days)))
    }

    async fn list_tickers(&self) -> Result<Vec<String>> {
        let mut tickers: Vec<String> = self.files.keys().cloned().collect();
        tickers.sort();
        Ok(tickers)
    }
}

#[async_trait]
impl FundamentalsProvider for InMemoryProvider {
    async fn income_statements(&self, ticker: &str) -> Result<Option<Vec<IncomeStatement>>> {
        Ok(self
            .files
            .get(&normalize(ticker))
            .map(|f| f.statements.clone())
            .filter(|s| !s.is_empty()))
    }

    async fn fundamentals(&self, ticker: &str) -> Result<Option<FundamentalSnapshot>> {
        Ok(self
            .files
            .get(&normalize(ticker))
            .and_then(|f| f.fundamentals.clone()))
    }

    async fn ownership(&self, ticker: &str) -> Result<Option<OwnershipSnapshot>> {
        Ok(self
            .files
            .get(&normalize(ticker))
            .and_then(|f| f.ownership.clone()))
    }
}
