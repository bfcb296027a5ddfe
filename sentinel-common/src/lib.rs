//! Sentinel Common - Shared configuration, errors and logging for Sentinel tools.
//!
//! This crate provides:
//! - Configuration types and loading
//! - Configuration validation
//! - Error types and handling utilities
//! - Logging setup

#![warn(clippy::all)]
#![allow(clippy::pedantic)]

pub mod config;
pub mod error;
pub mod logging;
pub mod validation;

pub use config::{Config, ObservabilityConfig, ScoringConfig, ScreenerConfig, StudyConfig};
pub use error::{exit_code_for, Error, Result, ResultExt};
pub use validation::{Validate, ValidationError, ValidationResult};

/// Re-export commonly used types for convenience
pub mod prelude {
    pub use crate::config::{Config, ScoringConfig, ScreenerConfig, StudyConfig};
    pub use crate::error::{Error, Result};
    pub use crate::logging::init_logging;
    pub use crate::validation::{Validate, ValidationError};
}
