//! Error types for usage retrieval and export

/// Result type for usage operations
pub type Result<T> = std::result::Result<T, UsageError>;

/// Error types for usage retrieval.
///
/// A provider's "not found" answer is not represented here: it is an expected
/// outcome and is returned as `Ok(None)` by the provider methods that allow it.
#[derive(Debug, thiserror::Error)]
pub enum UsageError {
    /// The API answered with a non-success status
    #[error("GitHub API error ({status}) for {url}: {message}")]
    Api {
        status: u16,
        url: String,
        message: String,
    },

    /// Transport-level HTTP failure (connection, timeout, body decoding)
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Failure reported by a non-HTTP provider
    #[error("Provider error: {0}")]
    Provider(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A value could not be parsed (visibility, output mode, ...)
    #[error("Invalid value: {0}")]
    InvalidValue(String),

    /// CSV serialization error
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl UsageError {
    /// Whether the error came from the remote API with the given status
    pub fn is_status(&self, code: u16) -> bool {
        matches!(self, UsageError::Api { status, .. } if *status == code)
    }
}

impl From<String> for UsageError {
    fn from(s: String) -> Self {
        UsageError::Other(s)
    }
}

impl From<&str> for UsageError {
    fn from(s: &str) -> Self {
        UsageError::Other(s.to_string())
    }
}

impl From<anyhow::Error> for UsageError {
    fn from(err: anyhow::Error) -> Self {
        UsageError::Other(err.to_string())
    }
}
