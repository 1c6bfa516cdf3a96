//! The completion boundary used by the optimizer.
//!
//! The optimizer only ever needs one kind of call: a fixed system prompt plus
//! a user payload in, text out. Providers implement [`CompletionModel`] and
//! callers hold them as `Arc<dyn CompletionModel>`, so tests can swap in a
//! scripted double.

use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// A single completion request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionRequest {
    /// Role/instructions for the model.
    pub system_prompt: String,

    /// User content built from the request and prior step outputs.
    pub user_prompt: String,

    /// Sampling temperature.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,

    /// Upper bound on generated tokens.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<usize>,
}

impl CompletionRequest {
    /// Create a request with the given system and user prompts.
    pub fn new(system_prompt: impl Into<String>, user_prompt: impl Into<String>) -> Self {
        Self {
            system_prompt: system_prompt.into(),
            user_prompt: user_prompt.into(),
            temperature: None,
            max_tokens: None,
        }
    }

    /// Set the sampling temperature.
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Set the maximum number of generated tokens.
    pub fn with_max_tokens(mut self, max_tokens: usize) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }
}

/// Token accounting reported by the provider.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageMetadata {
    pub input_tokens: usize,
    pub output_tokens: usize,
    pub total_tokens: usize,
}

impl UsageMetadata {
    pub fn new(input_tokens: usize, output_tokens: usize) -> Self {
        Self {
            input_tokens,
            output_tokens,
            total_tokens: input_tokens + output_tokens,
        }
    }
}

/// Text returned by a provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionResponse {
    /// Generated text.
    pub content: String,

    /// Model that produced the text.
    pub model: String,

    /// Token usage, if reported.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<UsageMetadata>,
}

impl CompletionResponse {
    pub fn new(content: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            model: model.into(),
            usage: None,
        }
    }

    pub fn with_usage(mut self, usage: UsageMetadata) -> Self {
        self.usage = Some(usage);
        self
    }
}

/// A model that turns a system prompt and user input into text.
///
/// Implementations must be `Send + Sync`; the optimizer calls them from
/// spawned tasks during parallel execution.
#[async_trait]
pub trait CompletionModel: Send + Sync {
    /// Run one completion. Errors are classified by
    /// [`LlmError::is_retryable`](crate::LlmError::is_retryable).
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse>;

    /// Identifier of the underlying model.
    fn model_name(&self) -> &str;
}
