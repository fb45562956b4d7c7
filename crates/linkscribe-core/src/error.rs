use thiserror::Error;

/// Application-wide error types for linkscribe.
#[derive(Error, Debug)]
pub enum AppError {
    /// HTTP request failed before a status was received.
    #[error("HTTP error: {0}")]
    HttpError(String),

    /// Upstream service answered with a non-success status.
    #[error("Upstream returned HTTP {status}: {message}")]
    UpstreamStatus { status: u16, message: String },

    /// Request timed out.
    #[error("Request timed out after {0} seconds")]
    Timeout(u64),

    /// Network/connection error.
    #[error("Network error: {0}")]
    NetworkError(String),

    /// The model provider failed in a way that may succeed on retry
    /// (network, 5xx, rate limit, timeout).
    #[error("{provider} transient error: {message}")]
    TransientProvider { provider: String, message: String },

    /// The model provider rejected the request or returned nothing usable.
    #[error("{provider} error: {message}")]
    PermanentProvider { provider: String, message: String },

    /// The configured model has no known context window.
    #[error("Unsupported model '{model}' for provider {provider}")]
    UnsupportedModel { provider: String, model: String },

    /// Startup configuration is invalid or incomplete.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Text extraction gave up on a URL.
    #[error("Extraction failed for {url} after {attempts} attempt(s): {message}")]
    ExtractionFailed {
        url: String,
        attempts: u32,
        message: String,
    },

    /// JSON serialization/deserialization failed.
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// The run was cancelled before the operation finished.
    #[error("Operation cancelled")]
    Cancelled,
}

impl AppError {
    /// Returns true if this error is transient and worth retrying.
    pub fn is_retryable(&self) -> bool {
        match self {
            AppError::NetworkError(_)
            | AppError::Timeout(_)
            | AppError::TransientProvider { .. } => true,
            AppError::UpstreamStatus { status, .. } => {
                *status == 408 || *status == 429 || *status >= 500
            }
            AppError::HttpError(msg) => {
                msg.contains("timeout") || msg.contains("connect") || msg.contains("reset")
            }
            _ => false,
        }
    }

    /// Returns true if this error must stop the run before any document
    /// processing happens.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            AppError::UnsupportedModel { .. } | AppError::ConfigError(_)
        )
    }

    pub fn transient(provider: &str, message: impl Into<String>) -> Self {
        AppError::TransientProvider {
            provider: provider.to_string(),
            message: message.into(),
        }
    }

    pub fn permanent(provider: &str, message: impl Into<String>) -> Self {
        AppError::PermanentProvider {
            provider: provider.to_string(),
            message: message.into(),
        }
    }
}
