//! Configuration management for Sentinel services.
//!
//! All Sentinel tools share a single configuration file at `~/.sentinel/config.json`.
//!
//! # Configuration Priority
//!
//! 1. Environment variables (SENTINEL_* prefix)
//! 2. Explicit config file values
//! 3. Default values
//!
//! # Environment Variable Mapping
//!
//! ## Observability
//! - `SENTINEL_LOG_LEVEL` → observability.log_level
//! - `SENTINEL_LOG_FORMAT` → observability.log_format
//!
//! ## Scoring
//! - `SENTINEL_STOP_LOSS_ATR` → scoring.stop_loss_atr
//! - `SENTINEL_TARGET_R_MULTIPLE` → scoring.target_r_multiple
//! - `SENTINEL_MIN_RS_RATING` → scoring.min_rs_rating
//! - `SENTINEL_MIN_VCP_SCORE` → scoring.min_vcp_score
//! - `SENTINEL_MIN_PROFIT_FACTOR` → scoring.min_profit_factor
//!
//! ## Screener
//! - `SENTINEL_DATA_DIR` → screener.data_dir
//! - `SENTINEL_MAX_CONCURRENCY` → screener.max_concurrency

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Get the configuration directory path.
pub fn config_dir() -> PathBuf {
    directories::UserDirs::new().map_or_else(
        || PathBuf::from(".sentinel"),
        |dirs| dirs.home_dir().join(".sentinel"),
    )
}

/// Get the configuration file path.
pub fn config_path() -> PathBuf {
    config_dir().join("config.json")
}

// ============================================================================
// Observability Configuration
// ============================================================================

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level", alias = "level")]
    pub log_level: String,

    /// Log format (json, pretty)
    #[serde(default = "default_log_format", alias = "format")]
    pub log_format: String,

    /// Additional module targets to hold at `warn`.
    #[serde(default)]
    pub excluded_targets: Vec<String>,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: default_log_format(),
            excluded_targets: Vec::new(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

// ============================================================================
// Scoring Configuration
// ============================================================================

/// Parameters read by the analyzers and by callers filtering their output.
///
/// The analyzers only compute scores. The `min_*` fields are inclusion
/// thresholds applied by callers on top of those scores.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoringConfig {
    /// Stop distance as a multiple of ATR
    #[serde(default = "default_stop_loss_atr")]
    pub stop_loss_atr: f64,

    /// Profit target as a multiple of the initial risk
    #[serde(default = "default_target_r_multiple")]
    pub target_r_multiple: f64,

    /// Minimum cross-sectional RS rating (1-99)
    #[serde(default = "default_min_rs_rating")]
    pub min_rs_rating: u8,

    /// Minimum VCP score (0-105)
    #[serde(default = "default_min_vcp_score")]
    pub min_vcp_score: i32,

    /// Minimum backtest profit factor
    #[serde(default = "default_min_profit_factor")]
    pub min_profit_factor: f64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            stop_loss_atr: default_stop_loss_atr(),
            target_r_multiple: default_target_r_multiple(),
            min_rs_rating: default_min_rs_rating(),
            min_vcp_score: default_min_vcp_score(),
            min_profit_factor: default_min_profit_factor(),
        }
    }
}

fn default_stop_loss_atr() -> f64 {
    2.0
}

fn default_target_r_multiple() -> f64 {
    2.5
}

fn default_min_rs_rating() -> u8 {
    70
}

fn default_min_vcp_score() -> i32 {
    55
}

fn default_min_profit_factor() -> f64 {
    1.1
}

// ============================================================================
// Screener Configuration
// ============================================================================

/// Batch scan configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScreenerConfig {
    /// Calendar lookback requested from the market-data provider
    #[serde(default = "default_lookback_days")]
    pub lookback_days: u32,

    /// Maximum number of tickers taken from the universe per scan
    #[serde(default = "default_max_tickers")]
    pub max_tickers: usize,

    /// Maximum number of in-flight provider requests
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,

    /// Tickers with fewer bars are dropped before RS rating
    #[serde(default = "default_min_history_bars")]
    pub min_history_bars: usize,

    /// Entries kept per ranking
    #[serde(default = "default_top_n")]
    pub top_n: usize,

    /// Directory of the local bar store
    #[serde(default = "default_data_dir")]
    pub data_dir: String,

    /// Report destination (stdout when unset)
    #[serde(default)]
    pub output_path: Option<String>,
}

impl Default for ScreenerConfig {
    fn default() -> Self {
        Self {
            lookback_days: default_lookback_days(),
            max_tickers: default_max_tickers(),
            max_concurrency: default_max_concurrency(),
            min_history_bars: default_min_history_bars(),
            top_n: default_top_n(),
            data_dir: default_data_dir(),
            output_path: None,
        }
    }
}

fn default_lookback_days() -> u32 {
    700
}

fn default_max_tickers() -> usize {
    200
}

fn default_max_concurrency() -> usize {
    8
}

fn default_min_history_bars() -> usize {
    200
}

fn default_top_n() -> usize {
    20
}

fn default_data_dir() -> String {
    config_dir().join("bars").to_string_lossy().into_owned()
}

// ============================================================================
// Study Configuration
// ============================================================================

/// Walk-forward signal study configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StudyConfig {
    /// Forward holding periods in bars
    #[serde(default = "default_hold_days")]
    pub hold_days: Vec<usize>,

    /// Bars between two evaluation points
    #[serde(default = "default_scan_step")]
    pub scan_step: usize,

    /// Index of the first evaluation point
    #[serde(default = "default_warmup_bars")]
    pub warmup_bars: usize,

    /// Tickers with fewer bars are skipped
    #[serde(default = "default_study_min_history")]
    pub min_history_bars: usize,

    /// Lookback requested from the provider
    #[serde(default = "default_study_lookback")]
    pub lookback_days: u32,
}

impl Default for StudyConfig {
    fn default() -> Self {
        Self {
            hold_days: default_hold_days(),
            scan_step: default_scan_step(),
            warmup_bars: default_warmup_bars(),
            min_history_bars: default_study_min_history(),
            lookback_days: default_study_lookback(),
        }
    }
}

fn default_hold_days() -> Vec<usize> {
    vec![5, 10, 20]
}

fn default_scan_step() -> usize {
    20
}

fn default_warmup_bars() -> usize {
    200
}

fn default_study_min_history() -> usize {
    250
}

fn default_study_lookback() -> u32 {
    445
}

// ============================================================================
// Root Configuration
// ============================================================================

/// Root configuration structure for Sentinel tools.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Logging configuration
    #[serde(default)]
    pub observability: ObservabilityConfig,

    /// Analyzer parameters
    #[serde(default)]
    pub scoring: ScoringConfig,

    /// Batch scan configuration
    #[serde(default)]
    pub screener: ScreenerConfig,

    /// Walk-forward study configuration
    #[serde(default)]
    pub study: StudyConfig,
}

impl Config {
    /// Load configuration from the default path.
    pub fn load() -> Result<Self> {
        let path = config_path();
        if !path.exists() {
            tracing::info!("Config file not found, using defaults");
            return Ok(Self::default());
        }

        Self::load_from(&path)
    }

    /// Load configuration from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config from {}", path.display()))?;

        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config from {}", path.display()))
    }

    /// Load configuration with environment variable overrides.
    pub fn load_with_env() -> Result<Self> {
        let mut config = Self::load()?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply environment variable overrides to the configuration.
    ///
    /// Values that fail to parse are ignored with a warning.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(level) = std::env::var("SENTINEL_LOG_LEVEL") {
            self.observability.log_level = level;
        }
        if let Ok(format) = std::env::var("SENTINEL_LOG_FORMAT") {
            self.observability.log_format = format;
        }

        override_parsed("SENTINEL_STOP_LOSS_ATR", &mut self.scoring.stop_loss_atr);
        override_parsed("SENTINEL_TARGET_R_MULTIPLE", &mut self.scoring.target_r_multiple);
        override_parsed("SENTINEL_MIN_RS_RATING", &mut self.scoring.min_rs_rating);
        override_parsed("SENTINEL_MIN_VCP_SCORE", &mut self.scoring.min_vcp_score);
        override_parsed("SENTINEL_MIN_PROFIT_FACTOR", &mut self.scoring.min_profit_factor);

        if let Ok(dir) = std::env::var("SENTINEL_DATA_DIR") {
            self.screener.data_dir = dir;
        }
        override_parsed("SENTINEL_MAX_CONCURRENCY", &mut self.screener.max_concurrency);
    }

    /// Save configuration to the default path.
    pub fn save(&self) -> Result<()> {
        let dir = config_dir();
        if !dir.exists() {
            fs::create_dir_all(&dir)
                .with_context(|| format!("Failed to create config directory {}", dir.display()))?;
        }

        let path = config_path();
        let content = serde_json::to_string_pretty(self)?;
        fs::write(&path, content)
            .with_context(|| format!("Failed to write config to {}", path.display()))
    }
}

fn override_parsed<T: FromStr>(key: &str, target: &mut T) {
    if let Ok(raw) = std::env::var(key) {
        match raw.trim().parse() {
            Ok(value) => *target = value,
            Err(_) => tracing::warn!(key, value = %raw, "Ignoring unparsable environment override"),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_scoring_config() {
        let config = ScoringConfig::default();
        assert!((config.stop_loss_atr - 2.0).abs() < f64::EPSILON);
        assert!((config.target_r_multiple - 2.5).abs() < f64::EPSILON);
        assert_eq!(config.min_rs_rating, 70);
        assert_eq!(config.min_vcp_score, 55);
        assert!((config.min_profit_factor - 1.1).abs() < f64::EPSILON);
    }

    #[test]
    fn test_default_study_config() {
        let config = StudyConfig::default();
        assert_eq!(config.hold_days, vec![5, 10, 20]);
        assert_eq!(config.scan_step, 20);
        assert_eq!(config.warmup_bars, 200);
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let json = r#"{ "scoring": { "stop_loss_atr": 3.0 }, "observability": { "level": "debug" } }"#;
        let config: Config = serde_json::from_str(json).unwrap();

        assert!((config.scoring.stop_loss_atr - 3.0).abs() < f64::EPSILON);
        assert!((config.scoring.target_r_multiple - 2.5).abs() < f64::EPSILON);
        assert_eq!(config.observability.log_level, "debug");
        assert_eq!(config.screener.max_concurrency, 8);
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{ "screener": { "top_n": 5, "data_dir": "/tmp/bars" } }"#).unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.screener.top_n, 5);
        assert_eq!(config.screener.data_dir, "/tmp/bars");
    }

    #[test]
    fn test_load_from_malformed_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, "{ not json").unwrap();

        assert!(Config::load_from(&path).is_err());
    }

    #[test]
    fn test_config_serialization_roundtrip() {
        let config = Config::default();
        let json = serde_json::to_string_pretty(&config).unwrap();
        assert!(json.contains("stop_loss_atr"));
        assert!(json.contains("hold_days"));

        let parsed: Config = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.scoring, config.scoring);
    }
}
