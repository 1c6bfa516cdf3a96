//! Error types for LLM provider implementations.

use thiserror::Error;

/// Result type for LLM operations.
pub type Result<T> = std::result::Result<T, LlmError>;

/// Errors that can occur when calling an LLM provider.
#[derive(Debug, Error)]
pub enum LlmError {
    /// HTTP request failed before a response was received.
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    /// Failed to serialize/deserialize data.
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// API authentication failed.
    #[error("Authentication failed: {0}")]
    AuthenticationError(String),

    /// API key not found in environment.
    #[error("API key not found: {0}")]
    ApiKeyNotFound(String),

    /// Model not found or unavailable.
    #[error("Model not found: {0}")]
    ModelNotFound(String),

    /// Provider service unavailable (5xx, overloaded).
    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    /// Rate limit exceeded.
    #[error("Rate limit exceeded: {0}")]
    RateLimitExceeded(String),

    /// Invalid request parameters.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Invalid response from provider.
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// Request timeout.
    #[error("Request timeout: {0}")]
    Timeout(String),

    /// General provider error.
    #[error("Provider error: {0}")]
    ProviderError(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Generic error with context.
    #[error("{0}")]
    Other(String),
}

impl LlmError {
    /// Check if this error is worth retrying.
    ///
    /// Anything that is not clearly caused by the request or the credentials
    /// counts as retryable, including unclassified provider errors.
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            LlmError::AuthenticationError(_)
                | LlmError::ApiKeyNotFound(_)
                | LlmError::ModelNotFound(_)
                | LlmError::InvalidRequest(_)
                | LlmError::ConfigError(_)
        )
    }

    /// Check if this error is due to authentication.
    pub fn is_auth_error(&self) -> bool {
        matches!(
            self,
            LlmError::AuthenticationError(_) | LlmError::ApiKeyNotFound(_)
        )
    }

    /// Short machine-readable name of the error variant.
    pub fn kind(&self) -> &'static str {
        match self {
            LlmError::HttpError(_) => "http",
            LlmError::SerializationError(_) => "serialization",
            LlmError::AuthenticationError(_) => "authentication",
            LlmError::ApiKeyNotFound(_) => "api_key_not_found",
            LlmError::ModelNotFound(_) => "model_not_found",
            LlmError::ServiceUnavailable(_) => "service_unavailable",
            LlmError::RateLimitExceeded(_) => "rate_limited",
            LlmError::InvalidRequest(_) => "invalid_request",
            LlmError::InvalidResponse(_) => "invalid_response",
            LlmError::Timeout(_) => "timeout",
            LlmError::ProviderError(_) => "provider",
            LlmError::ConfigError(_) => "config",
            LlmError::Other(_) => "other",
        }
    }

    /// Map an HTTP status and body to the matching error variant.
    pub fn from_status(status: u16, body: impl Into<String>) -> Self {
        let body = body.into();
        match status {
            401 | 403 => LlmError::AuthenticationError(body),
            404 => LlmError::ModelNotFound(body),
            400 | 422 => LlmError::InvalidRequest(body),
            408 => LlmError::Timeout(body),
            429 => LlmError::RateLimitExceeded(body),
            500..=599 => LlmError::ServiceUnavailable(format!("status {}: {}", status, body)),
            _ => LlmError::ProviderError(format!("status {}: {}", status, body)),
        }
    }
}

impl From<serde_json::Error> for LlmError {
    fn from(err: serde_json::Error) -> Self {
        LlmError::SerializationError(err.to_string())
    }
}
