//! Configuration validation for Sentinel tools.
//!
//! Ranges are checked up front so analyzers never see a stop multiple of
//! zero or a concurrency limit that would stall a scan.

use thiserror::Error;

use crate::config::{Config, ObservabilityConfig, ScoringConfig, ScreenerConfig, StudyConfig};

/// Configuration validation error.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Missing required field: {field}")]
    MissingField { field: String },

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("Multiple validation errors: {0:?}")]
    Multiple(Vec<ValidationError>),
}

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

impl From<ValidationError> for crate::error::Error {
    fn from(err: ValidationError) -> Self {
        Self::Config(err.to_string())
    }
}

/// Trait for validatable configuration sections.
pub trait Validate {
    /// Validate this configuration section.
    fn validate(&self) -> ValidationResult<()>;
}

fn invalid(field: &str, reason: impl Into<String>) -> ValidationError {
    ValidationError::InvalidValue {
        field: field.into(),
        reason: reason.into(),
    }
}

fn collapse(mut errors: Vec<ValidationError>) -> ValidationResult<()> {
    match errors.len() {
        0 => Ok(()),
        1 => Err(errors.remove(0)),
        _ => Err(ValidationError::Multiple(errors)),
    }
}

impl Config {
    /// Validate the entire configuration.
    pub fn validate(&self) -> ValidationResult<()> {
        let errors = [
            self.observability.validate(),
            self.scoring.validate(),
            self.screener.validate(),
            self.study.validate(),
        ]
        .into_iter()
        .filter_map(Result::err)
        .collect();

        collapse(errors)
    }
}

impl Validate for ObservabilityConfig {
    fn validate(&self) -> ValidationResult<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.log_level.to_lowercase().as_str()) {
            return Err(invalid(
                "observability.log_level",
                format!("must be one of: {}", valid_levels.join(", ")),
            ));
        }

        let valid_formats = ["json", "pretty"];
        if !valid_formats.contains(&self.log_format.to_lowercase().as_str()) {
            return Err(invalid(
                "observability.log_format",
                format!("must be one of: {}", valid_formats.join(", ")),
            ));
        }

        Ok(())
    }
}

impl Validate for ScoringConfig {
    fn validate(&self) -> ValidationResult<()> {
        let mut errors = Vec::new();

        if !self.stop_loss_atr.is_finite() || self.stop_loss_atr <= 0.0 {
            errors.push(invalid("scoring.stop_loss_atr", "must be a positive number"));
        }
        if !self.target_r_multiple.is_finite() || self.target_r_multiple <= 0.0 {
            errors.push(invalid("scoring.target_r_multiple", "must be a positive number"));
        }
        if !(1..=99).contains(&self.min_rs_rating) {
            errors.push(invalid("scoring.min_rs_rating", "must be between 1 and 99"));
        }
        if !(0..=105).contains(&self.min_vcp_score) {
            errors.push(invalid("scoring.min_vcp_score", "must be between 0 and 105"));
        }
        if !self.min_profit_factor.is_finite() || self.min_profit_factor < 0.0 {
            errors.push(invalid("scoring.min_profit_factor", "must not be negative"));
        }

        collapse(errors)
    }
}

impl Validate for ScreenerConfig {
    fn validate(&self) -> ValidationResult<()> {
        let mut errors = Vec::new();

        if self.max_concurrency == 0 {
            errors.push(invalid("screener.max_concurrency", "must be at least 1"));
        }
        if self.max_tickers == 0 {
            errors.push(invalid("screener.max_tickers", "must be at least 1"));
        }
        if self.top_n == 0 {
            errors.push(invalid("screener.top_n", "must be at least 1"));
        }
        if self.data_dir.trim().is_empty() {
            errors.push(ValidationError::MissingField {
                field: "screener.data_dir".into(),
            });
        }

        collapse(errors)
    }
}

impl Validate for StudyConfig {
    fn validate(&self) -> ValidationResult<()> {
        let mut errors = Vec::new();

        if self.hold_days.is_empty() {
            errors.push(ValidationError::MissingField {
                field: "study.hold_days".into(),
            });
        }
        if self.hold_days.contains(&0) {
            errors.push(invalid("study.hold_days", "holding periods must be positive"));
        }
        if self.scan_step == 0 {
            errors.push(invalid("study.scan_step", "must be at least 1"));
        }

        collapse(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test]
    fn test_default_config_is_valid() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_validation_error_maps_to_config_error() {
        let err = crate::error::Error::from(invalid("scoring.stop_loss_atr", "must be positive"));
        assert!(matches!(err, crate::error::Error::Config(_)));
        assert_eq!(err.exit_code(), 78);
        assert!(err.to_string().contains("scoring.stop_loss_atr"));
    }

    #[test_case("verbose", "pretty" ; "bad level")]
    #[test_case("info", "xml" ; "bad format")]
    fn test_invalid_observability(level: &str, format: &str) {
        let config = ObservabilityConfig {
            log_level: level.into(),
            log_format: format.into(),
            excluded_targets: Vec::new(),
        };
        assert!(matches!(
            config.validate(),
            Err(ValidationError::InvalidValue { .. })
        ));
    }

    #[test]
    fn test_scoring_single_error_is_not_wrapped() {
        let config = ScoringConfig {
            stop_loss_atr: 0.0,
            ..ScoringConfig::default()
        };
        match config.validate() {
            Err(ValidationError::InvalidValue { field, .. }) => {
                assert_eq!(field, "scoring.stop_loss_atr");
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn test_scoring_multiple_errors() {
        let config = ScoringConfig {
            stop_loss_atr: -1.0,
            target_r_multiple: f64::NAN,
            min_rs_rating: 0,
            ..ScoringConfig::default()
        };
        match config.validate() {
            Err(ValidationError::Multiple(errors)) => assert_eq!(errors.len(), 3),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn test_screener_zero_concurrency() {
        let config = ScreenerConfig {
            max_concurrency: 0,
            ..ScreenerConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_study_requires_hold_days() {
        let config = StudyConfig {
            hold_days: Vec::new(),
            ..StudyConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ValidationError::MissingField { .. })
        ));
    }
}
