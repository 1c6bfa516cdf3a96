//! Configuration module for the optimizer
//!
//! Provides YAML configuration loading for:
//! - Retry policy
//! - Workflow routing and worker pool settings
//! - Per-step model parameters
//! - Response caching
//! - Environment variable expansion and file includes

pub mod loader;
pub mod optimizer;

pub use loader::{expand_env_in_string, load_yaml_config, load_yaml_file};
pub use optimizer::{AgentSettings, AgentsConfig, CacheSettings, OptimizerConfig, WorkflowSettings};
