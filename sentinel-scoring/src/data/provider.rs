//! Data-source contracts.
//!
//! The scoring core never fetches anything itself. A scan pulls bars and
//! fundamentals through these traits, and every method may legitimately
//! return `None`: a missing ticker or a missing snapshot is not an error.

use anyhow::Result;
use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::BarSeries;

// ============================================================================
// Fundamental Snapshots
// ============================================================================

/// One annual income statement.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IncomeStatement {
    /// Fiscal period end
    #[serde(default)]
    pub date: Option<NaiveDate>,
    /// Basic EPS
    #[serde(default)]
    pub eps: Option<f64>,
    /// Diluted EPS, used when basic EPS is absent
    #[serde(default)]
    pub eps_diluted: Option<f64>,
    /// Total revenue
    #[serde(default)]
    pub revenue: Option<f64>,
}

impl IncomeStatement {
    /// EPS with the diluted figure as fallback.
    pub fn earnings_per_share(&self) -> Option<f64> {
        self.eps.or(self.eps_diluted)
    }
}

/// Growth figures reported by the fundamentals source, in percent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FundamentalSnapshot {
    #[serde(default)]
    pub earnings_growth_yoy: Option<f64>,
    #[serde(default)]
    pub revenue_growth_yoy: Option<f64>,
}

/// Ownership data.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OwnershipSnapshot {
    /// Share of outstanding stock held by institutions, in percent
    #[serde(default)]
    pub institutional_pct: Option<f64>,
}

/// Everything the fundamental scorer can use for one ticker.
///
/// Precedence: statements (when at least two periods exist), then the
/// snapshot, then nothing (zero contribution).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FundamentalData {
    /// Annual statements, most recent first
    #[serde(default)]
    pub statements: Vec<IncomeStatement>,
    #[serde(default)]
    pub snapshot: Option<FundamentalSnapshot>,
    #[serde(default)]
    pub ownership: Option<OwnershipSnapshot>,
}

impl FundamentalData {
    /// Whether no source carried anything.
    pub fn is_empty(&self) -> bool {
        self.statements.is_empty() && self.snapshot.is_none() && self.ownership.is_none()
    }
}

// ============================================================================
// Provider Traits
// ============================================================================

/// Source of daily bars.
#[async_trait]
pub trait BarProvider: Send + Sync {
    /// Provider name for logging
    fn name(&self) -> &str;

    /// Fetch the daily bars of `ticker` covering the last `lookback_days`.
    ///
    /// `Ok(None)` when the source has no data for the ticker. A short
    /// series is returned as-is; analyzers handle short history themselves.
    async fn fetch_bars(&self, ticker: &str, lookback_days: u32) -> Result<Option<BarSeries>>;

    /// Every ticker the provider can serve, when it can enumerate them.
    async fn list_tickers(&self) -> Result<Vec<String>> {
        Ok(Vec::new())
    }
}

/// Source of fundamentals and ownership snapshots.
#[async_trait]
pub trait FundamentalsProvider: Send + Sync {
    /// Annual income statements, most recent first.
    async fn income_statements(&self, ticker: &str) -> Result<Option<Vec<IncomeStatement>>>;

    /// Growth snapshot.
    async fn fundamentals(&self, ticker: &str) -> Result<Option<FundamentalSnapshot>>;

    /// Ownership snapshot.
    async fn ownership(&self, ticker: &str) -> Result<Option<OwnershipSnapshot>>;

    /// Collect all three sources. Individual failures degrade to absent data.
    async fn fundamental_data(&self, ticker: &str) -> FundamentalData {
        let statements = self.income_statements(ticker).await.unwrap_or_else(|e| {
            tracing::debug!(ticker, error = %e, "Income statements unavailable");
            None
        });
        let snapshot = self.fundamentals(ticker).await.unwrap_or_else(|e| {
            tracing::debug!(ticker, error = %e, "Fundamentals snapshot unavailable");
            None
        });
        let ownership = self.ownership(ticker).await.unwrap_or_else(|e| {
            tracing::debug!(ticker, error = %e, "Ownership snapshot unavailable");
            None
        });

        FundamentalData {
            statements: statements.unwrap_or_default(),
            snapshot,
            ownership,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_eps_falls_back_to_diluted() {
        let stmt: IncomeStatement =
            serde_json::from_str(r#"{"date":"2024-12-31","epsDiluted":1.5,"revenue":100.0}"#)
                .unwrap();
        assert_eq!(stmt.eps, None);
        assert_eq!(stmt.earnings_per_share(), Some(1.5));
    }

    #[test]
    fn test_basic_eps_takes_precedence() {
        let stmt = IncomeStatement {
            eps: Some(2.0),
            eps_diluted: Some(1.9),
            ..Default::default()
        };
        assert_eq!(stmt.earnings_per_share(), Some(2.0));
    }

    #[test]
    fn test_empty_fundamental_data() {
        assert!(FundamentalData::default().is_empty());
        let data = FundamentalData {
            ownership: Some(OwnershipSnapshot { institutional_pct: Some(55.0) }),
            ..Default::default()
        };
        assert!(!data.is_empty());
    }

    /// Serves ownership only; every other call fails.
    struct FlakySource;

    #[async_trait]
    impl FundamentalsProvider for FlakySource {
        async fn income_statements(&self, _ticker: &str) -> Result<Option<Vec<IncomeStatement>>> {
            anyhow::bail!("statements endpoint down")
        }

        async fn fundamentals(&self, _ticker: &str) -> Result<Option<FundamentalSnapshot>> {
            anyhow::bail!("rate limited")
        }

        async fn ownership(&self, _ticker: &str) -> Result<Option<OwnershipSnapshot>> {
            Ok(Some(OwnershipSnapshot {
                institutional_pct: Some(42.0),
            }))
        }
    }

    #[test]
    fn test_fundamental_data_degrades_per_source() {
        let data = tokio_test::block_on(FlakySource.fundamental_data("ACME"));

        assert!(data.statements.is_empty());
        assert!(data.snapshot.is_none());
        assert_eq!(data.ownership.unwrap().institutional_pct, Some(42.0));
    }
}
