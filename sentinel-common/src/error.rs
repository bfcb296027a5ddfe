//! Error types for Sentinel tools.

use thiserror::Error;

/// Result type alias using the Sentinel error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Unified error type for Sentinel tools.
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid input (malformed series, bad arguments)
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Ticker or resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Other error with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    /// Create an error with additional context.
    pub fn with_context(self, context: impl Into<String>) -> Self {
        Self::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Check if this error means the requested data does not exist.
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::NotFound(_) => true,
            Self::Io(e) => e.kind() == std::io::ErrorKind::NotFound,
            Self::WithContext { source, .. } => source.is_not_found(),
            _ => false,
        }
    }

    /// Process exit code for command-line tools.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Config(_) => 78,
            Self::InvalidInput(_) | Self::Json(_) => 65,
            Self::NotFound(_) => 66,
            Self::Io(_) => 74,
            Self::WithContext { source, .. } => source.exit_code(),
        }
    }
}

/// Exit code for an error reaching a binary's `main`.
///
/// Uses the first typed [`Error`] in the chain, else 1.
pub fn exit_code_for(err: &anyhow::Error) -> i32 {
    err.chain()
        .find_map(|cause| cause.downcast_ref::<Error>())
        .map_or(1, Error::exit_code)
}

/// Extension trait for adding context to any error type.
pub trait ResultExt<T> {
    /// Add context to an error.
    fn context(self, context: impl Into<String>) -> Result<T>;
}

impl<T, E: Into<Error>> ResultExt<T> for std::result::Result<T, E> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.into().with_context(context))
    }
}
