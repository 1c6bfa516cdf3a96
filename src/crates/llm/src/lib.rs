//! LLM completion boundary for the prompt optimizer.
//!
//! The optimizer treats the model as an opaque collaborator: given a system
//! prompt and user input it returns text or an error. This crate defines that
//! boundary ([`CompletionModel`]), the error taxonomy used to decide whether a
//! failed call is worth retrying ([`LlmError`]), and a remote provider.
//!
//! # Example Usage
//!
//! ```rust,ignore
//! use llm::remote::GrokClient;
//! use llm::{CompletionModel, CompletionRequest, RemoteLlmConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = RemoteLlmConfig::xai_from_env()?;
//!     let client = GrokClient::new(config)?;
//!
//!     let request = CompletionRequest::new(
//!         "You are a prompt engineering assistant.",
//!         "Explain quantum computing briefly",
//!     )
//!     .with_temperature(0.7);
//!
//!     let response = client.complete(request).await?;
//!     println!("Response: {}", response.content);
//!
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod model;

#[cfg(feature = "remote")]
pub mod remote;

pub use config::RemoteLlmConfig;
pub use error::{LlmError, Result};
pub use model::{CompletionModel, CompletionRequest, CompletionResponse, UsageMetadata};
