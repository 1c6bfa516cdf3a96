//! Remote LLM provider implementations.
//!
//! # Providers
//!
//! - **Grok** - xAI's Grok models over the OpenAI-compatible chat API

pub mod grok;

pub use grok::GrokClient;
