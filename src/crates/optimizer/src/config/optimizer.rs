//! Optimizer configuration
//!
//! Retry policy, workflow routing/concurrency settings and per-step model
//! parameters. Loaded from YAML (see [`super::loader`]) with `OPTIMIZER_*`
//! environment overrides applied on top.

use crate::agent::StepName;
use crate::executor::RetryConfig;
use crate::router::{PromptCategory, DEFAULT_LENGTH_THRESHOLD};
use crate::{OptimizerError, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::Path;
use std::time::Duration;

use super::loader::load_yaml_config;

/// Top-level optimizer configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimizerConfig {
    /// Retry policy shared by every step
    pub retry: RetryConfig,

    /// Routing and concurrency settings
    pub workflow: WorkflowSettings,

    /// Per-step model parameters
    pub agents: AgentsConfig,

    /// Reuse of successful model responses
    pub cache: CacheSettings,
}

impl OptimizerConfig {
    /// Load configuration from a YAML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let config: Self = load_yaml_config(path)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration with environment variable overrides
    pub fn from_file_with_env(path: impl AsRef<Path>) -> Result<Self> {
        let mut config: Self = load_yaml_config(path)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Defaults plus environment overrides
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env_overrides();
        config
    }

    /// Apply environment variable overrides
    ///
    /// Supported environment variables:
    /// - OPTIMIZER_MAX_RETRIES: Total attempts per step
    /// - OPTIMIZER_INITIAL_BACKOFF_MS: Delay before the first retry
    /// - OPTIMIZER_MAX_BACKOFF_MS: Backoff cap
    /// - OPTIMIZER_BACKOFF_JITTER: Enable jitter (true/false)
    /// - OPTIMIZER_ENABLE_PARALLEL: Allow parallel execution (true/false)
    /// - OPTIMIZER_MAX_WORKERS: Worker pool capacity
    /// - OPTIMIZER_PARALLEL_THRESHOLD: Prompt length that triggers parallel mode
    /// - OPTIMIZER_TIMEOUT_SECS: Overall workflow deadline
    /// - OPTIMIZER_CACHE_ENABLED: Reuse successful responses (true/false)
    /// - OPTIMIZER_CACHE_TTL_SECS: How long a cached response stays valid
    ///
    /// Unparseable values are ignored.
    pub fn apply_env_overrides(&mut self) {
        if let Some(value) = env_parse::<u32>("OPTIMIZER_MAX_RETRIES") {
            self.retry.max_retries = value;
        }
        if let Some(value) = env_parse::<u64>("OPTIMIZER_INITIAL_BACKOFF_MS") {
            self.retry.initial_backoff_ms = value;
        }
        if let Some(value) = env_parse::<u64>("OPTIMIZER_MAX_BACKOFF_MS") {
            self.retry.max_backoff_ms = value;
        }
        if let Some(value) = env_flag("OPTIMIZER_BACKOFF_JITTER") {
            self.retry.jitter = value;
        }
        if let Some(value) = env_flag("OPTIMIZER_ENABLE_PARALLEL") {
            self.workflow.enable_parallel = value;
        }
        if let Some(value) = env_parse::<usize>("OPTIMIZER_MAX_WORKERS") {
            self.workflow.max_workers = value;
        }
        if let Some(value) = env_parse::<usize>("OPTIMIZER_PARALLEL_THRESHOLD") {
            self.workflow.parallel_length_threshold = value;
        }
        if let Some(value) = env_parse::<u64>("OPTIMIZER_TIMEOUT_SECS") {
            self.workflow.timeout_secs = Some(value);
        }
        if let Some(value) = env_flag("OPTIMIZER_CACHE_ENABLED") {
            self.cache.enabled = value;
        }
        if let Some(value) = env_parse::<u64>("OPTIMIZER_CACHE_TTL_SECS") {
            self.cache.ttl_secs = value;
        }
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        self.retry.validate()?;
        self.workflow.validate()?;
        self.cache.validate()?;
        self.agents.validate()
    }

    /// Retry policy for one step, honoring its `max_retries` override
    pub fn retry_for(&self, step: StepName) -> RetryConfig {
        let mut retry = self.retry.clone();
        if let Some(max_retries) = self.agents.for_step(step).max_retries {
            retry.max_retries = max_retries;
        }
        retry
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_workflow(mut self, workflow: WorkflowSettings) -> Self {
        self.workflow = workflow;
        self
    }

    pub fn with_cache(mut self, cache: CacheSettings) -> Self {
        self.cache = cache;
        self
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    env::var(name).ok().and_then(|v| v.trim().parse().ok())
}

fn env_flag(name: &str) -> Option<bool> {
    let value = env::var(name).ok()?;
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Response cache settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    pub enabled: bool,

    /// Lifetime of a cached response, in seconds
    pub ttl_secs: u64,

    /// Entries kept before the oldest is evicted
    pub max_entries: usize,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl_secs: 3600,
            max_entries: 1000,
        }
    }
}

impl CacheSettings {
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }

    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    pub fn validate(&self) -> Result<()> {
        if !self.enabled {
            return Ok(());
        }
        if self.ttl_secs == 0 {
            return Err(OptimizerError::Config(
                "cache.ttl_secs must be greater than 0".to_string(),
            ));
        }
        if self.max_entries == 0 {
            return Err(OptimizerError::Config(
                "cache.max_entries must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Routing and concurrency settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkflowSettings {
    /// Allow the parallel execution mode at all
    pub enable_parallel: bool,

    /// Worker pool capacity; parallel mode needs at least 2
    pub max_workers: usize,

    /// Prompts longer than this many characters route to parallel
    pub parallel_length_threshold: usize,

    /// Categories that route to parallel regardless of length
    pub parallel_categories: Vec<PromptCategory>,

    /// Deadline for a whole run, in seconds
    pub timeout_secs: Option<u64>,
}

impl Default for WorkflowSettings {
    fn default() -> Self {
        Self {
            enable_parallel: true,
            max_workers: 3,
            parallel_length_threshold: DEFAULT_LENGTH_THRESHOLD,
            parallel_categories: PromptCategory::parallel_defaults(),
            timeout_secs: None,
        }
    }
}

impl WorkflowSettings {
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }

    pub fn with_timeout(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = Some(timeout_secs);
        self
    }

    pub fn with_max_workers(mut self, max_workers: usize) -> Self {
        self.max_workers = max_workers;
        self
    }

    pub fn with_parallel(mut self, enabled: bool) -> Self {
        self.enable_parallel = enabled;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_workers == 0 {
            return Err(OptimizerError::Config(
                "max_workers must be at least 1".to_string(),
            ));
        }
        if self.timeout_secs == Some(0) {
            return Err(OptimizerError::Config(
                "timeout_secs must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// Model parameters for one step
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AgentSettings {
    pub temperature: f32,
    pub max_tokens: usize,

    /// Overrides `retry.max_retries` for this step
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_retries: Option<u32>,
}

impl AgentSettings {
    pub const fn new(temperature: f32, max_tokens: usize) -> Self {
        Self {
            temperature,
            max_tokens,
            max_retries: None,
        }
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = Some(max_retries);
        self
    }

    fn validate(&self, step: StepName) -> Result<()> {
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(OptimizerError::Config(format!(
                "{}: temperature must be between 0.0 and 2.0, got {}",
                step, self.temperature
            )));
        }
        if self.max_tokens == 0 {
            return Err(OptimizerError::Config(format!(
                "{}: max_tokens must be greater than 0",
                step
            )));
        }
        if self.max_retries == Some(0) {
            return Err(OptimizerError::Config(format!(
                "{}: max_retries must be at least 1",
                step
            )));
        }
        Ok(())
    }
}

/// Per-step model parameters
///
/// An entry given in a config file must set both `temperature` and
/// `max_tokens`; omitted entries keep their defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentsConfig {
    pub deconstruct: AgentSettings,
    pub diagnose_preliminary: AgentSettings,
    pub diagnose: AgentSettings,
    pub design: AgentSettings,
    pub sample: AgentSettings,
    pub evaluate: AgentSettings,
}

impl Default for AgentsConfig {
    fn default() -> Self {
        Self {
            deconstruct: AgentSettings::new(0.5, 1500),
            diagnose_preliminary: AgentSettings::new(0.4, 800),
            diagnose: AgentSettings::new(0.4, 1500),
            design: AgentSettings::new(0.6, 2000),
            sample: AgentSettings::new(0.8, 1000),
            evaluate: AgentSettings::new(0.3, 1000),
        }
    }
}

impl AgentsConfig {
    pub fn for_step(&self, step: StepName) -> &AgentSettings {
        match step {
            StepName::Deconstruct => &self.deconstruct,
            StepName::DiagnosePreliminary => &self.diagnose_preliminary,
            StepName::DiagnoseFull => &self.diagnose,
            StepName::Design => &self.design,
            StepName::Sample => &self.sample,
            StepName::Evaluate => &self.evaluate,
        }
    }

    fn validate(&self) -> Result<()> {
        StepName::ALL
            .into_iter()
            .try_for_each(|step| self.for_step(step).validate(step))
    }
}
