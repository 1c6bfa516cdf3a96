//! Agent workflow orchestration for prompt optimization
//!
//! A prompt goes through five LLM-backed stages (deconstruct, diagnose,
//! design, sample, evaluate). This crate decides whether the first two run
//! concurrently, retries failed calls with exponential backoff, falls back to
//! sequential execution when the parallel phase fails, and always returns an
//! aggregate [`WorkflowResult`] with one entry per stage.
//!
//! ```rust,ignore
//! use optimizer::{OptimizerConfig, WorkflowOrchestrator};
//! use optimizer::router::{ModeOverride, PromptCategory};
//!
//! let orchestrator = WorkflowOrchestrator::new(model, OptimizerConfig::default())?;
//! let result = orchestrator
//!     .run_workflow("Explain quantum computing", PromptCategory::Technical, ModeOverride::Auto)
//!     .await?;
//! println!("{}", result.mode_used);
//! ```

pub mod agent;
pub mod config;
pub mod executor;
pub mod router;
pub mod workflow;

pub use config::{AgentsConfig, CacheSettings, OptimizerConfig, WorkflowSettings};
pub use executor::{retry_with_backoff, RetryConfig};
pub use router::{ModeOverride, PromptCategory, RequestContext, RoutingPolicy};
pub use workflow::{ModeUsed, StepError, StepOutput, StepResult, WorkflowOrchestrator, WorkflowResult};

use llm::LlmError;
use thiserror::Error;

/// Errors that can occur during optimization
#[derive(Debug, Error)]
pub enum OptimizerError {
    /// A unit of work failed on every allowed attempt
    #[error("{operation} failed after {attempts} attempts: {source}")]
    ExhaustedRetries {
        operation: String,
        attempts: u32,
        #[source]
        source: LlmError,
    },

    /// A call failed with an error that retrying cannot fix
    #[error("{operation} rejected by provider: {source}")]
    CallRejected {
        operation: String,
        #[source]
        source: LlmError,
    },

    /// Invalid request supplied at workflow entry
    #[error("Invalid workflow request: {0}")]
    Configuration(String),

    /// Parallel phase failed; resolved internally by the sequential fallback
    #[error("Parallel phase failed: {0}")]
    ParallelPhase(String),

    /// Workflow deadline reached
    #[error("Workflow timed out: {0}")]
    Timeout(String),

    /// Configuration file could not be loaded or validated
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl OptimizerError {
    /// Stable error kind used in serialized step results.
    pub fn kind(&self) -> &'static str {
        match self {
            OptimizerError::ExhaustedRetries { .. } => "exhausted_retries",
            OptimizerError::CallRejected { .. } => "call_rejected",
            OptimizerError::Configuration(_) => "configuration",
            OptimizerError::ParallelPhase(_) => "parallel_phase",
            OptimizerError::Timeout(_) => "timeout",
            OptimizerError::Config(_) => "config",
            OptimizerError::Serialization(_) => "serialization",
        }
    }
}

/// Result type for optimizer operations
pub type Result<T> = std::result::Result<T, OptimizerError>;

/// Get version information
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds() {
        let exhausted = OptimizerError::ExhaustedRetries {
            operation: "deconstruct".to_string(),
            attempts: 3,
            source: LlmError::Timeout("slow".to_string()),
        };
        assert_eq!(exhausted.kind(), "exhausted_retries");
        assert!(exhausted.to_string().contains("after 3 attempts"));

        let config = OptimizerError::Configuration("empty prompt".to_string());
        assert_eq!(config.kind(), "configuration");
    }

    #[test]
    fn test_exhausted_retries_keeps_cause() {
        use std::error::Error as _;

        let err = OptimizerError::ExhaustedRetries {
            operation: "design".to_string(),
            attempts: 2,
            source: LlmError::RateLimitExceeded("429".to_string()),
        };
        let cause = err.source().map(|s| s.to_string()).unwrap_or_default();
        assert!(cause.contains("Rate limit exceeded"));
    }

    #[test]
    fn test_version() {
        assert!(!version().is_empty());
    }
}
