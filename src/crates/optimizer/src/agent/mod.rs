//! Stage agents
//!
//! A [`WorkUnit`] is one LLM call of the pipeline: a step name plus a fully
//! built completion request. Units are built from the request context and
//! the outputs of earlier steps, then executed by an [`AgentRunner`].

mod cache;
pub mod prompts;
mod runner;

pub use cache::{CacheStats, ResponseCache};
pub use runner::AgentRunner;

use crate::config::AgentsConfig;
use crate::router::RequestContext;
use llm::{CompletionModel, CompletionRequest, CompletionResponse};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Pipeline stages, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Deconstruct,
    Diagnose,
    Design,
    Sample,
    Evaluate,
}

impl Stage {
    pub const ALL: [Stage; 5] = [
        Stage::Deconstruct,
        Stage::Diagnose,
        Stage::Design,
        Stage::Sample,
        Stage::Evaluate,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Deconstruct => "deconstruct",
            Stage::Diagnose => "diagnose",
            Stage::Design => "design",
            Stage::Sample => "sample",
            Stage::Evaluate => "evaluate",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Individual LLM calls; the diagnose stage has a preliminary and a full pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepName {
    Deconstruct,
    DiagnosePreliminary,
    DiagnoseFull,
    Design,
    Sample,
    Evaluate,
}

impl StepName {
    pub const ALL: [StepName; 6] = [
        StepName::Deconstruct,
        StepName::DiagnosePreliminary,
        StepName::DiagnoseFull,
        StepName::Design,
        StepName::Sample,
        StepName::Evaluate,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StepName::Deconstruct => "deconstruct",
            StepName::DiagnosePreliminary => "diagnose_preliminary",
            StepName::DiagnoseFull => "diagnose_full",
            StepName::Design => "design",
            StepName::Sample => "sample",
            StepName::Evaluate => "evaluate",
        }
    }

    /// Stage this step reports under
    pub fn stage(&self) -> Stage {
        match self {
            StepName::Deconstruct => Stage::Deconstruct,
            StepName::DiagnosePreliminary | StepName::DiagnoseFull => Stage::Diagnose,
            StepName::Design => Stage::Design,
            StepName::Sample => Stage::Sample,
            StepName::Evaluate => Stage::Evaluate,
        }
    }
}

impl fmt::Display for StepName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One executable LLM call
#[derive(Debug, Clone, PartialEq)]
pub struct WorkUnit {
    name: StepName,
    request: CompletionRequest,
}

impl WorkUnit {
    pub fn new(name: StepName, request: CompletionRequest) -> Self {
        Self { name, request }
    }

    fn build(name: StepName, ctx: &RequestContext, agents: &AgentsConfig, input: String) -> Self {
        let settings = agents.for_step(name);
        let request = CompletionRequest::new(prompts::system_prompt(name, ctx.category()), input)
            .with_temperature(settings.temperature)
            .with_max_tokens(settings.max_tokens);
        Self::new(name, request)
    }

    pub fn deconstruct(ctx: &RequestContext, agents: &AgentsConfig) -> Self {
        Self::build(
            StepName::Deconstruct,
            ctx,
            agents,
            prompts::deconstruct_input(ctx.prompt()),
        )
    }

    pub fn diagnose_preliminary(ctx: &RequestContext, agents: &AgentsConfig) -> Self {
        Self::build(
            StepName::DiagnosePreliminary,
            ctx,
            agents,
            prompts::preliminary_input(ctx.prompt()),
        )
    }

    pub fn diagnose_full(
        ctx: &RequestContext,
        agents: &AgentsConfig,
        deconstruction: &str,
        preliminary: Option<&str>,
    ) -> Self {
        Self::build(
            StepName::DiagnoseFull,
            ctx,
            agents,
            prompts::diagnose_input(ctx.prompt(), deconstruction, preliminary),
        )
    }

    pub fn design(ctx: &RequestContext, agents: &AgentsConfig, deconstruction: &str, diagnosis: &str) -> Self {
        Self::build(
            StepName::Design,
            ctx,
            agents,
            prompts::design_input(ctx.prompt(), deconstruction, diagnosis),
        )
    }

    /// The sample step runs the optimized prompt itself as user input.
    pub fn sample(ctx: &RequestContext, agents: &AgentsConfig, optimized_prompt: &str) -> Self {
        Self::build(StepName::Sample, ctx, agents, optimized_prompt.to_string())
    }

    pub fn evaluate(
        ctx: &RequestContext,
        agents: &AgentsConfig,
        optimized_prompt: &str,
        sample_output: &str,
    ) -> Self {
        Self::build(
            StepName::Evaluate,
            ctx,
            agents,
            prompts::evaluate_input(ctx.prompt(), optimized_prompt, sample_output),
        )
    }

    pub fn name(&self) -> StepName {
        self.name
    }

    pub fn request(&self) -> &CompletionRequest {
        &self.request
    }

    /// Make one attempt against the model
    pub async fn invoke(&self, model: &dyn CompletionModel) -> llm::Result<CompletionResponse> {
        model.complete(self.request.clone()).await
    }
}
