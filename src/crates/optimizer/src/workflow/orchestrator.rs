//! Workflow orchestrator
//!
//! Runs the five stages for one request. In parallel mode the deconstruct
//! step and a preliminary diagnosis run concurrently on the worker pool; if
//! either fails the whole pipeline is rerun sequentially. A failed stage never
//! stops the pipeline: later stages get placeholder input instead.

use super::result::{ModeUsed, StageResults, StepError, StepOutput, StepResult, WorkflowResult};
use crate::agent::{AgentRunner, ResponseCache, Stage, StepName, WorkUnit};
use crate::config::OptimizerConfig;
use crate::router::{ModeOverride, PromptCategory, RequestContext, RoutingPolicy};
use crate::{OptimizerError, Result};
use chrono::Utc;
use llm::CompletionModel;
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

pub const DECONSTRUCTION_PLACEHOLDER: &str = "(deconstruction unavailable)";
pub const DIAGNOSIS_PLACEHOLDER: &str = "(diagnosis unavailable)";
pub const SAMPLE_PLACEHOLDER: &str = "Sample output generation failed.";

/// Per-run accumulator
#[derive(Default)]
struct RunState {
    stages: StageResults,
    preliminary: Option<StepResult>,
    non_fatal_errors: Vec<String>,
}

impl RunState {
    fn record(&mut self, stage: Stage, result: StepResult) {
        if let StepResult::Err(error) = &result {
            self.non_fatal_errors.push(format!("{}: {}", stage, error));
        }
        self.stages.insert(stage, result);
    }
}

/// Coordinates the stage agents for prompt optimization runs
///
/// Runs are independent; one orchestrator can serve concurrent requests,
/// which then share its worker pool.
pub struct WorkflowOrchestrator {
    runner: AgentRunner,
    policy: RoutingPolicy,
    pool: Arc<Semaphore>,
    config: Arc<OptimizerConfig>,
}

impl WorkflowOrchestrator {
    /// Create an orchestrator around an LLM client
    pub fn new(model: Arc<dyn CompletionModel>, config: OptimizerConfig) -> Result<Self> {
        config.validate()?;

        let config = Arc::new(config);
        Ok(Self {
            runner: AgentRunner::new(model, Arc::clone(&config)),
            policy: RoutingPolicy::from_settings(&config.workflow),
            pool: Arc::new(Semaphore::new(config.workflow.max_workers)),
            config,
        })
    }

    /// Use an existing worker pool instead of a private one
    ///
    /// Routing follows the permits the pool has now, so a pool with fewer
    /// than two permits keeps automatic routing sequential.
    pub fn with_worker_pool(mut self, pool: Arc<Semaphore>) -> Self {
        self.policy.max_workers = pool.available_permits();
        self.pool = pool;
        self
    }

    /// Share a response cache with other orchestrators; `None` disables caching
    pub fn with_response_cache(mut self, cache: Option<Arc<ResponseCache>>) -> Self {
        self.runner = self.runner.with_cache(cache);
        self
    }

    pub fn response_cache(&self) -> Option<&Arc<ResponseCache>> {
        self.runner.cache()
    }

    pub fn config(&self) -> &OptimizerConfig {
        &self.config
    }

    pub fn policy(&self) -> &RoutingPolicy {
        &self.policy
    }

    /// Optimize `prompt` end to end
    pub async fn run_workflow(
        &self,
        prompt: impl Into<String>,
        category: PromptCategory,
        mode_override: ModeOverride,
    ) -> Result<WorkflowResult> {
        let ctx = RequestContext::new(prompt, category, mode_override);
        self.run(&ctx).await
    }

    /// Run the workflow for a prepared request
    ///
    /// Only request validation errors are returned; stage failures are
    /// reported inside the result.
    pub async fn run(&self, ctx: &RequestContext) -> Result<WorkflowResult> {
        self.policy.validate_request(ctx)?;

        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        let deadline = self.deadline();
        let parallel = self.policy.decide(ctx);

        info!(
            run_id = %run_id,
            model = self.runner.model_name(),
            category = %ctx.category(),
            prompt_length = ctx.prompt_length(),
            mode_override = %ctx.mode_override(),
            mode = if parallel { "parallel" } else { "sequential" },
            "Starting workflow"
        );

        let mut state = RunState::default();
        let mode_used = if parallel {
            match self.run_parallel_phase(ctx, deadline).await {
                Ok((deconstruction, preliminary)) => {
                    let deconstruction_text = deconstruction.content.clone();
                    let notes = preliminary.content.clone();
                    state.record(Stage::Deconstruct, StepResult::Ok(deconstruction));
                    state.preliminary = Some(StepResult::Ok(preliminary));

                    self.run_remaining(ctx, &mut state, Some(&deconstruction_text), Some(&notes), deadline)
                        .await;
                    ModeUsed::Parallel
                }
                Err(e) => {
                    warn!(run_id = %run_id, error = %e, "Falling back to sequential execution");
                    state
                        .non_fatal_errors
                        .push(format!("{}; reran pipeline sequentially", e));

                    self.run_sequential(ctx, &mut state, deadline).await;
                    ModeUsed::SequentialFallback
                }
            }
        } else {
            self.run_sequential(ctx, &mut state, deadline).await;
            ModeUsed::Sequential
        };

        for stage in state.stages.fill_missing("was not executed") {
            state
                .non_fatal_errors
                .push(format!("{}: no result recorded", stage));
        }

        let result = WorkflowResult {
            run_id,
            original_prompt: ctx.prompt().to_string(),
            category: ctx.category(),
            mode_used,
            stages: state.stages,
            preliminary_diagnosis: state.preliminary,
            non_fatal_errors: state.non_fatal_errors,
            started_at,
            completed_at: Utc::now(),
        };

        info!(
            run_id = %run_id,
            mode = %result.mode_used,
            succeeded = result.succeeded_stages(),
            errors = result.non_fatal_errors.len(),
            duration_ms = result.duration_ms(),
            "Workflow completed"
        );

        Ok(result)
    }

    /// Deadline for a run starting now; a timeout too large to represent
    /// means no deadline
    fn deadline(&self) -> Option<Instant> {
        let timeout = self.config.workflow.timeout()?;
        let deadline = Instant::now().checked_add(timeout);
        if deadline.is_none() {
            warn!(timeout_secs = timeout.as_secs(), "Workflow timeout out of range, running without a deadline");
        }
        deadline
    }

    async fn run_sequential(&self, ctx: &RequestContext, state: &mut RunState, deadline: Option<Instant>) {
        let unit = WorkUnit::deconstruct(ctx, &self.config.agents);
        let deconstruction = self.runner.run_until(&unit, deadline).await;
        let text = deconstruction.content().map(str::to_string);
        state.record(Stage::Deconstruct, deconstruction);

        self.run_remaining(ctx, state, text.as_deref(), None, deadline).await;
    }

    /// Phase 1 of parallel mode
    ///
    /// Both steps hold a worker-pool permit while they run. The first failure
    /// aborts the other task.
    async fn run_parallel_phase(
        &self,
        ctx: &RequestContext,
        deadline: Option<Instant>,
    ) -> Result<(StepOutput, StepOutput)> {
        let agents = &self.config.agents;
        let mut tasks = JoinSet::new();

        for unit in [
            WorkUnit::deconstruct(ctx, agents),
            WorkUnit::diagnose_preliminary(ctx, agents),
        ] {
            let runner = self.runner.clone();
            let pool = Arc::clone(&self.pool);
            tasks.spawn(async move {
                let step = unit.name();
                let result = match acquire_worker(pool, deadline).await {
                    Ok(_permit) => runner.run_until(&unit, deadline).await,
                    Err(error) => StepResult::Err(error.for_step(step)),
                };
                (step, result)
            });
        }

        let mut deconstruction = None;
        let mut preliminary = None;

        while let Some(joined) = tasks.join_next().await {
            let (step, result) = match joined {
                Ok(pair) => pair,
                Err(e) => {
                    tasks.abort_all();
                    return Err(OptimizerError::ParallelPhase(format!("worker task failed: {}", e)));
                }
            };

            match result {
                StepResult::Ok(output) => {
                    debug!(step = %step, "Parallel step finished");
                    if step == StepName::Deconstruct {
                        deconstruction = Some(output);
                    } else {
                        preliminary = Some(output);
                    }
                }
                StepResult::Err(error) => {
                    tasks.abort_all();
                    return Err(OptimizerError::ParallelPhase(format!("{} failed: {}", step, error)));
                }
            }
        }

        deconstruction.zip(preliminary).ok_or_else(|| {
            OptimizerError::ParallelPhase("phase finished without both outputs".to_string())
        })
    }

    /// Diagnose, design, sample and evaluate, substituting placeholders for
    /// failed inputs
    async fn run_remaining(
        &self,
        ctx: &RequestContext,
        state: &mut RunState,
        deconstruction: Option<&str>,
        preliminary: Option<&str>,
        deadline: Option<Instant>,
    ) {
        let agents = &self.config.agents;
        let deconstruction = deconstruction.unwrap_or(DECONSTRUCTION_PLACEHOLDER);

        let unit = WorkUnit::diagnose_full(ctx, agents, deconstruction, preliminary);
        let diagnosis = self.runner.run_until(&unit, deadline).await;
        let diagnosis_text = diagnosis.content().unwrap_or(DIAGNOSIS_PLACEHOLDER).to_string();
        state.record(Stage::Diagnose, diagnosis);

        let unit = WorkUnit::design(ctx, agents, deconstruction, &diagnosis_text);
        let design = self.runner.run_until(&unit, deadline).await;
        let optimized = design
            .output()
            .and_then(|o| o.metadata_str("optimized_prompt"))
            .filter(|p| !p.trim().is_empty())
            .unwrap_or(ctx.prompt())
            .to_string();
        state.record(Stage::Design, design);

        let unit = WorkUnit::sample(ctx, agents, &optimized);
        let sample = self.runner.run_until(&unit, deadline).await;
        let sample_text = sample.content().unwrap_or(SAMPLE_PLACEHOLDER).to_string();
        state.record(Stage::Sample, sample);

        let unit = WorkUnit::evaluate(ctx, agents, &optimized, &sample_text);
        let evaluation = self.runner.run_until(&unit, deadline).await;
        state.record(Stage::Evaluate, evaluation);
    }
}

enum AcquireError {
    Closed,
    Deadline,
}

impl AcquireError {
    fn for_step(self, step: StepName) -> StepError {
        match self {
            AcquireError::Closed => StepError::cancelled("worker pool is closed"),
            AcquireError::Deadline => StepError::timeout(step),
        }
    }
}

/// Wait for a worker-pool permit, giving up at `deadline`
async fn acquire_worker(
    pool: Arc<Semaphore>,
    deadline: Option<Instant>,
) -> std::result::Result<OwnedSemaphorePermit, AcquireError> {
    let acquired = match deadline {
        Some(deadline) => tokio::time::timeout_at(deadline, pool.acquire_owned())
            .await
            .map_err(|_| AcquireError::Deadline)?,
        None => pool.acquire_owned().await,
    };
    acquired.map_err(|_| AcquireError::Closed)
}
