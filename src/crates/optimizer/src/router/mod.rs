//! Execution mode routing
//!
//! Decides whether a request runs its first two stages concurrently or walks
//! the whole pipeline sequentially. Routing is a pure function of the request
//! category, the prompt length and the caller's override, so the same inputs
//! always pick the same mode.

use crate::config::WorkflowSettings;
use crate::{OptimizerError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Prompt length (in characters) above which auto routing picks parallel.
pub const DEFAULT_LENGTH_THRESHOLD: usize = 500;

/// Kind of prompt being optimized
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PromptCategory {
    #[default]
    General,
    Creative,
    Technical,
    Analytical,
    Marketing,
}

impl PromptCategory {
    pub const ALL: [PromptCategory; 5] = [
        PromptCategory::General,
        PromptCategory::Creative,
        PromptCategory::Technical,
        PromptCategory::Analytical,
        PromptCategory::Marketing,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PromptCategory::General => "general",
            PromptCategory::Creative => "creative",
            PromptCategory::Technical => "technical",
            PromptCategory::Analytical => "analytical",
            PromptCategory::Marketing => "marketing",
        }
    }

    /// Categories that default to parallel execution
    pub fn parallel_defaults() -> Vec<PromptCategory> {
        vec![
            PromptCategory::Creative,
            PromptCategory::Technical,
            PromptCategory::Analytical,
        ]
    }
}

impl fmt::Display for PromptCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PromptCategory {
    type Err = OptimizerError;

    fn from_str(s: &str) -> Result<Self> {
        let normalized = s.trim().to_lowercase();
        PromptCategory::ALL
            .into_iter()
            .find(|c| c.as_str() == normalized)
            .ok_or_else(|| {
                OptimizerError::Configuration(format!(
                    "unknown category '{}' (expected one of: general, creative, technical, analytical, marketing)",
                    s
                ))
            })
    }
}

/// Caller's choice of execution mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModeOverride {
    /// Let the routing policy decide
    #[default]
    Auto,
    Parallel,
    Sequential,
}

impl ModeOverride {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModeOverride::Auto => "auto",
            ModeOverride::Parallel => "parallel",
            ModeOverride::Sequential => "sequential",
        }
    }
}

impl fmt::Display for ModeOverride {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ModeOverride {
    type Err = OptimizerError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "" | "auto" => Ok(ModeOverride::Auto),
            "parallel" => Ok(ModeOverride::Parallel),
            "sequential" => Ok(ModeOverride::Sequential),
            other => Err(OptimizerError::Configuration(format!(
                "unknown mode override '{}' (expected auto, parallel or sequential)",
                other
            ))),
        }
    }
}

/// Immutable input to one workflow run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestContext {
    prompt: String,
    category: PromptCategory,
    #[serde(default)]
    mode_override: ModeOverride,
}

impl RequestContext {
    pub fn new(prompt: impl Into<String>, category: PromptCategory, mode_override: ModeOverride) -> Self {
        Self {
            prompt: prompt.into(),
            category,
            mode_override,
        }
    }

    /// Build a context from raw strings, as received from a CLI or API.
    ///
    /// A missing override means auto.
    pub fn parse(prompt: impl Into<String>, category: &str, mode_override: Option<&str>) -> Result<Self> {
        let category = category.parse::<PromptCategory>()?;
        let mode_override = match mode_override {
            Some(raw) => raw.parse::<ModeOverride>()?,
            None => ModeOverride::Auto,
        };
        Ok(Self::new(prompt, category, mode_override))
    }

    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    pub fn category(&self) -> PromptCategory {
        self.category
    }

    pub fn mode_override(&self) -> ModeOverride {
        self.mode_override
    }

    /// Prompt length in Unicode scalar values
    pub fn prompt_length(&self) -> usize {
        self.prompt.chars().count()
    }
}

/// Routing rules derived from [`WorkflowSettings`]
#[derive(Debug, Clone, PartialEq)]
pub struct RoutingPolicy {
    pub parallel_categories: Vec<PromptCategory>,
    pub length_threshold: usize,
    pub parallel_enabled: bool,
    pub max_workers: usize,
}

impl Default for RoutingPolicy {
    fn default() -> Self {
        Self {
            parallel_categories: PromptCategory::parallel_defaults(),
            length_threshold: DEFAULT_LENGTH_THRESHOLD,
            parallel_enabled: true,
            max_workers: 3,
        }
    }
}

impl RoutingPolicy {
    pub fn from_settings(settings: &WorkflowSettings) -> Self {
        Self {
            parallel_categories: settings.parallel_categories.clone(),
            length_threshold: settings.parallel_length_threshold,
            parallel_enabled: settings.enable_parallel,
            max_workers: settings.max_workers,
        }
    }

    /// Decide whether the request should use parallel execution.
    ///
    /// An explicit override always wins. Otherwise parallel is chosen for
    /// the configured categories or for prompts longer than the threshold.
    pub fn should_use_parallel(
        &self,
        category: PromptCategory,
        prompt_length: usize,
        mode_override: ModeOverride,
    ) -> bool {
        match mode_override {
            ModeOverride::Parallel => true,
            ModeOverride::Sequential => false,
            ModeOverride::Auto => {
                self.parallel_categories.contains(&category) || prompt_length > self.length_threshold
            }
        }
    }

    /// Routing decision for a full request.
    ///
    /// Auto routing never picks parallel when it is disabled or the pool
    /// cannot hold two workers; an explicit parallel override in that
    /// situation is rejected by [`validate_request`](Self::validate_request).
    pub fn decide(&self, ctx: &RequestContext) -> bool {
        if ctx.mode_override() == ModeOverride::Auto && !self.parallel_available() {
            return false;
        }
        self.should_use_parallel(ctx.category(), ctx.prompt_length(), ctx.mode_override())
    }

    /// Reject requests that cannot run under this policy
    pub fn validate_request(&self, ctx: &RequestContext) -> Result<()> {
        if ctx.prompt().trim().is_empty() {
            return Err(OptimizerError::Configuration(
                "prompt must not be empty".to_string(),
            ));
        }

        if ctx.mode_override() == ModeOverride::Parallel {
            if !self.parallel_enabled {
                return Err(OptimizerError::Configuration(
                    "parallel mode requested but parallel execution is disabled".to_string(),
                ));
            }
            if self.max_workers < 2 {
                return Err(OptimizerError::Configuration(format!(
                    "parallel mode requested but the worker pool only has {} worker(s)",
                    self.max_workers
                )));
            }
        }

        Ok(())
    }

    fn parallel_available(&self) -> bool {
        self.parallel_enabled && self.max_workers >= 2
    }
}

/// Routing decision under the default policy
pub fn should_use_parallel(category: PromptCategory, prompt_length: usize, mode_override: ModeOverride) -> bool {
    RoutingPolicy::default().should_use_parallel(category, prompt_length, mode_override)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_override_wins() {
        for category in PromptCategory::ALL {
            for length in [0, 10, 500, 501, 10_000] {
                assert!(should_use_parallel(category, length, ModeOverride::Parallel));
                assert!(!should_use_parallel(category, length, ModeOverride::Sequential));
            }
        }
    }

    #[test]
    fn test_auto_routing_by_category() {
        assert!(should_use_parallel(PromptCategory::Creative, 10, ModeOverride::Auto));
        assert!(should_use_parallel(PromptCategory::Technical, 10, ModeOverride::Auto));
        assert!(should_use_parallel(PromptCategory::Analytical, 10, ModeOverride::Auto));
        assert!(!should_use_parallel(PromptCategory::General, 10, ModeOverride::Auto));
        assert!(!should_use_parallel(PromptCategory::Marketing, 10, ModeOverride::Auto));
    }

    #[test]
    fn test_auto_routing_length_threshold() {
        assert!(!should_use_parallel(PromptCategory::General, 500, ModeOverride::Auto));
        assert!(should_use_parallel(PromptCategory::General, 501, ModeOverride::Auto));
        assert!(should_use_parallel(PromptCategory::Marketing, 600, ModeOverride::Auto));
    }

    #[test]
    fn test_prompt_length_counts_chars() {
        let prompt = "é".repeat(300);
        let ctx = RequestContext::new(prompt, PromptCategory::General, ModeOverride::Auto);
        assert_eq!(ctx.prompt_length(), 300);
        assert!(!RoutingPolicy::default().decide(&ctx));
    }

    #[test]
    fn test_routing_is_deterministic() {
        let policy = RoutingPolicy::default();
        let ctx = RequestContext::new("Write a poem", PromptCategory::Creative, ModeOverride::Auto);
        let first = policy.decide(&ctx);
        assert!((0..10).all(|_| policy.decide(&ctx) == first));
    }

    #[test]
    fn test_disabled_parallel_routes_auto_to_sequential() {
        let policy = RoutingPolicy {
            parallel_enabled: false,
            ..RoutingPolicy::default()
        };
        let ctx = RequestContext::new("Write a poem", PromptCategory::Creative, ModeOverride::Auto);
        assert!(!policy.decide(&ctx));
    }

    #[test]
    fn test_validate_empty_prompt() {
        let policy = RoutingPolicy::default();
        let ctx = RequestContext::new("   \n", PromptCategory::General, ModeOverride::Auto);
        assert!(matches!(
            policy.validate_request(&ctx),
            Err(OptimizerError::Configuration(_))
        ));
    }

    #[test]
    fn test_validate_parallel_override_when_unavailable() {
        let ctx = RequestContext::new("Summarize", PromptCategory::General, ModeOverride::Parallel);

        let disabled = RoutingPolicy {
            parallel_enabled: false,
            ..RoutingPolicy::default()
        };
        assert!(disabled.validate_request(&ctx).is_err());

        let single_worker = RoutingPolicy {
            max_workers: 1,
            ..RoutingPolicy::default()
        };
        assert!(single_worker.validate_request(&ctx).is_err());

        assert!(RoutingPolicy::default().validate_request(&ctx).is_ok());
    }

    #[test]
    fn test_parse_context() {
        let ctx = RequestContext::parse("Explain DNS", " Technical ", Some("sequential")).unwrap();
        assert_eq!(ctx.category(), PromptCategory::Technical);
        assert_eq!(ctx.mode_override(), ModeOverride::Sequential);

        let ctx = RequestContext::parse("Explain DNS", "general", None).unwrap();
        assert_eq!(ctx.mode_override(), ModeOverride::Auto);
    }

    #[test]
    fn test_parse_rejects_unknown_values() {
        assert!(matches!(
            RequestContext::parse("x", "poetry", None),
            Err(OptimizerError::Configuration(_))
        ));
        assert!(matches!(
            RequestContext::parse("x", "general", Some("fast")),
            Err(OptimizerError::Configuration(_))
        ));
    }

    #[test]
    fn test_serde_names() {
        assert_eq!(serde_json::to_string(&PromptCategory::Analytical).unwrap(), "\"analytical\"");
        let mode: ModeOverride = serde_json::from_str("\"parallel\"").unwrap();
        assert_eq!(mode, ModeOverride::Parallel);
    }
}
