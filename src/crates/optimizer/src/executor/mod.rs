//! Call Execution Module
//!
//! Retry logic for LLM calls and parsing of the text they return.

pub mod parser;
pub mod retry;

pub use parser::{extract_json, extract_optimized_prompt, extract_score, DEFAULT_QUALITY_SCORE};
pub use retry::{classify_error, retry_with_backoff, ErrorClass, RetryConfig, RetryExecutor, RetryOutcome};
