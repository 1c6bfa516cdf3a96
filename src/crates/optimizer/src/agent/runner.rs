use super::cache::ResponseCache;
use super::{StepName, WorkUnit};
use crate::config::OptimizerConfig;
use crate::executor::{extract_json, extract_optimized_prompt, extract_score, RetryExecutor};
use crate::workflow::{StepError, StepOutput, StepResult};
use llm::{CompletionModel, CompletionResponse};
use serde_json::json;
use std::sync::Arc;
use std::time::Instant as StdInstant;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Executes work units through the retrying call executor
///
/// Cheap to clone; clones share the model client and the response cache.
#[derive(Clone)]
pub struct AgentRunner {
    model: Arc<dyn CompletionModel>,
    config: Arc<OptimizerConfig>,
    cache: Option<Arc<ResponseCache>>,
}

impl AgentRunner {
    pub fn new(model: Arc<dyn CompletionModel>, config: Arc<OptimizerConfig>) -> Self {
        let cache = config
            .cache
            .enabled
            .then(|| Arc::new(ResponseCache::from_settings(&config.cache)));
        Self { model, config, cache }
    }

    /// Use `cache` instead of the one built from the configuration
    pub fn with_cache(mut self, cache: Option<Arc<ResponseCache>>) -> Self {
        self.cache = cache;
        self
    }

    pub fn cache(&self) -> Option<&Arc<ResponseCache>> {
        self.cache.as_ref()
    }

    pub fn model_name(&self) -> &str {
        self.model.model_name()
    }

    /// Run a unit to completion; never returns an error, only a failed step
    pub async fn run(&self, unit: &WorkUnit) -> StepResult {
        let step = unit.name();
        let started = StdInstant::now();

        if let Some(response) = self.cache.as_ref().and_then(|cache| cache.get(unit)) {
            let output = step_output(response, 0, 0, started).with_metadata("cached", json!(true));
            return StepResult::Ok(annotate(step, output));
        }

        let executor = RetryExecutor::new(self.config.retry_for(step));
        let model = self.model.as_ref();

        debug!(step = %step, model = self.model_name(), "Running step");

        match executor.execute(step.as_str(), move || unit.invoke(model)).await {
            Ok(outcome) => {
                if let Some(cache) = &self.cache {
                    cache.insert(unit, outcome.value.clone());
                }
                let delay_ms = outcome.total_delay.as_millis() as u64;
                let output = step_output(outcome.value, outcome.attempts, delay_ms, started);
                StepResult::Ok(annotate(step, output))
            }
            Err(e) => {
                warn!(step = %step, error = %e, "Step failed");
                StepResult::Err(StepError::from(&e))
            }
        }
    }

    /// Like [`run`](Self::run), but gives up at `deadline`
    pub async fn run_until(&self, unit: &WorkUnit, deadline: Option<Instant>) -> StepResult {
        let Some(deadline) = deadline else {
            return self.run(unit).await;
        };

        if Instant::now() >= deadline {
            return StepResult::Err(StepError::timeout(unit.name()));
        }

        match tokio::time::timeout_at(deadline, self.run(unit)).await {
            Ok(result) => result,
            Err(_) => {
                warn!(step = %unit.name(), "Step stopped at workflow deadline");
                StepResult::Err(StepError::timeout(unit.name()))
            }
        }
    }
}

fn step_output(response: CompletionResponse, attempts: u32, retry_delay_ms: u64, started: StdInstant) -> StepOutput {
    let mut output = StepOutput::new(response.content)
        .with_metadata("model", json!(response.model))
        .with_metadata("attempts", json!(attempts))
        .with_metadata("retry_delay_ms", json!(retry_delay_ms))
        .with_metadata("execution_time_ms", json!(started.elapsed().as_millis() as u64));
    if let Some(usage) = response.usage {
        output = output.with_metadata("tokens_used", json!(usage.total_tokens));
    }
    output
}

/// Step-specific fields pulled out of the response text
fn annotate(step: StepName, output: StepOutput) -> StepOutput {
    match step {
        StepName::Deconstruct => match extract_json(&output.content) {
            Some(components) if components.is_object() => output.with_metadata("components", components),
            _ => output,
        },
        StepName::Design => {
            let optimized = extract_optimized_prompt(&output.content);
            output.with_metadata("optimized_prompt", json!(optimized))
        }
        StepName::Evaluate => {
            let score = extract_score(&output.content);
            output.with_metadata("quality_score", json!(score))
        }
        _ => output,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CacheSettings, OptimizerConfig};
    use crate::executor::RetryConfig;
    use crate::router::{ModeOverride, PromptCategory, RequestContext};
    use async_trait::async_trait;
    use llm::{CompletionRequest, CompletionResponse, LlmError, UsageMetadata};
    use std::sync::Mutex;
    use std::time::Duration;

    struct ScriptedModel {
        replies: Mutex<Vec<llm::Result<CompletionResponse>>>,
    }

    impl ScriptedModel {
        fn new(mut replies: Vec<llm::Result<CompletionResponse>>) -> Self {
            replies.reverse();
            Self {
                replies: Mutex::new(replies),
            }
        }
    }

    #[async_trait]
    impl CompletionModel for ScriptedModel {
        async fn complete(&self, _request: CompletionRequest) -> llm::Result<CompletionResponse> {
            self.replies
                .lock()
                .unwrap()
                .pop()
                .unwrap_or_else(|| Err(LlmError::Other("script exhausted".to_string())))
        }

        fn model_name(&self) -> &str {
            "scripted"
        }
    }

    fn runner(replies: Vec<llm::Result<CompletionResponse>>) -> AgentRunner {
        let config = OptimizerConfig::default().with_retry(RetryConfig::new(3).with_initial_backoff(10));
        AgentRunner::new(Arc::new(ScriptedModel::new(replies)), Arc::new(config))
    }

    fn ctx() -> RequestContext {
        RequestContext::new("Write a product description", PromptCategory::Marketing, ModeOverride::Auto)
    }

    #[tokio::test(start_paused = true)]
    async fn test_design_output_gets_optimized_prompt() {
        let reply = CompletionResponse::new(
            "Optimized Prompt:\nWrite a 100-word description of a steel water bottle.\n\nExplanation:\nAdded length.",
            "scripted",
        )
        .with_usage(UsageMetadata::new(40, 20));
        let runner = runner(vec![Ok(reply)]);

        let unit = WorkUnit::design(&ctx(), &OptimizerConfig::default().agents, "parts", "issues");
        let output = runner.run(&unit).await.into_output().unwrap();

        assert_eq!(
            output.metadata["optimized_prompt"],
            "Write a 100-word description of a steel water bottle."
        );
        assert_eq!(output.metadata["tokens_used"], 60);
        assert_eq!(output.metadata["attempts"], 1);
        assert_eq!(output.metadata["model"], "scripted");
    }

    #[tokio::test(start_paused = true)]
    async fn test_evaluate_output_gets_score_after_retry() {
        let runner = runner(vec![
            Err(LlmError::ServiceUnavailable("503".to_string())),
            Ok(CompletionResponse::new("Overall score: 88/100", "scripted")),
        ]);

        let unit = WorkUnit::evaluate(&ctx(), &OptimizerConfig::default().agents, "better", "sample");
        let output = runner.run(&unit).await.into_output().unwrap();

        assert_eq!(output.metadata["quality_score"], 88);
        assert_eq!(output.metadata["attempts"], 2);
        assert_eq!(output.metadata["retry_delay_ms"], 10);
    }

    #[tokio::test(start_paused = true)]
    async fn test_deconstruct_components_from_json() {
        let runner = runner(vec![Ok(CompletionResponse::new(
            "```json\n{\"intent\": \"sell\", \"format\": \"paragraph\"}\n```",
            "scripted",
        ))]);

        let unit = WorkUnit::deconstruct(&ctx(), &OptimizerConfig::default().agents);
        let output = runner.run(&unit).await.into_output().unwrap();
        assert_eq!(output.metadata["components"]["intent"], "sell");
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_step_becomes_error() {
        let runner = runner(vec![
            Err(LlmError::Timeout("t1".to_string())),
            Err(LlmError::Timeout("t2".to_string())),
            Err(LlmError::Timeout("t3".to_string())),
        ]);

        let unit = WorkUnit::sample(&ctx(), &OptimizerConfig::default().agents, "prompt");
        let error = runner.run(&unit).await.into_error().unwrap();
        assert_eq!(error.kind, "exhausted_retries");
        assert!(error.message.contains("t3"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_permanent_error_is_rejected() {
        let runner = runner(vec![Err(LlmError::AuthenticationError("bad key".to_string()))]);

        let unit = WorkUnit::deconstruct(&ctx(), &OptimizerConfig::default().agents);
        let error = runner.run(&unit).await.into_error().unwrap();
        assert_eq!(error.kind, "call_rejected");
    }

    #[tokio::test(start_paused = true)]
    async fn test_repeated_call_served_from_cache() {
        // One scripted reply: a second model call would exhaust the script
        let runner = runner(vec![Ok(CompletionResponse::new("Overall score: 70/100", "scripted"))]);
        let unit = WorkUnit::evaluate(&ctx(), &OptimizerConfig::default().agents, "better", "sample");

        let first = runner.run(&unit).await.into_output().unwrap();
        let second = runner.run(&unit).await.into_output().unwrap();

        assert_eq!(second.content, first.content);
        assert_eq!(second.metadata["cached"], true);
        assert_eq!(second.metadata["attempts"], 0);
        assert_eq!(second.metadata["quality_score"], 70);
        assert_eq!(runner.cache().unwrap().stats().hits, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failures_are_not_cached() {
        let runner = runner(vec![
            Err(LlmError::InvalidRequest("rejected".to_string())),
            Ok(CompletionResponse::new("parts", "scripted")),
        ]);
        let unit = WorkUnit::deconstruct(&ctx(), &OptimizerConfig::default().agents);

        assert!(!runner.run(&unit).await.is_ok());
        let output = runner.run(&unit).await.into_output().unwrap();
        assert_eq!(output.content, "parts");
        assert!(output.metadata.get("cached").is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_disabled_cache_always_calls_model() {
        let config = OptimizerConfig::default()
            .with_retry(RetryConfig::new(1))
            .with_cache(CacheSettings::disabled());
        let model = ScriptedModel::new(vec![
            Ok(CompletionResponse::new("first", "scripted")),
            Ok(CompletionResponse::new("second", "scripted")),
        ]);
        let runner = AgentRunner::new(Arc::new(model), Arc::new(config));
        assert!(runner.cache().is_none());

        let unit = WorkUnit::deconstruct(&ctx(), &OptimizerConfig::default().agents);
        assert_eq!(runner.run(&unit).await.content(), Some("first"));
        assert_eq!(runner.run(&unit).await.content(), Some("second"));
    }

    struct SlowModel;

    #[async_trait]
    impl CompletionModel for SlowModel {
        async fn complete(&self, _request: CompletionRequest) -> llm::Result<CompletionResponse> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(CompletionResponse::new("late", "slow"))
        }

        fn model_name(&self) -> &str {
            "slow"
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_until_deadline() {
        let runner = AgentRunner::new(Arc::new(SlowModel), Arc::new(OptimizerConfig::default()));
        let unit = WorkUnit::deconstruct(&ctx(), &OptimizerConfig::default().agents);

        let deadline = Instant::now() + Duration::from_secs(5);
        let error = runner.run_until(&unit, Some(deadline)).await.into_error().unwrap();
        assert_eq!(error.kind, "timeout");
    }
}
