//! Scripted LLM double shared by the integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use llm::{CompletionModel, CompletionRequest, CompletionResponse, LlmError, UsageMetadata};
use optimizer::agent::{prompts, StepName};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;

pub const OPTIMIZED_TEXT: &str = "Explain quantum computing to a curious teenager in three short paragraphs.";

/// How a scripted step fails
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Failure {
    /// Retryable provider outage
    Transient,
    /// Rejected request; never retried
    Permanent,
}

impl Failure {
    fn error(&self, step: StepName) -> LlmError {
        match self {
            Failure::Transient => LlmError::ServiceUnavailable(format!("{} unavailable", step)),
            Failure::Permanent => LlmError::InvalidRequest(format!("{} rejected", step)),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Script {
    failure: Failure,
    /// `None` fails every attempt
    remaining: Option<u32>,
}

/// One call seen by the mock
#[derive(Debug, Clone)]
pub struct CallRecord {
    pub step: StepName,
    pub request: CompletionRequest,
    pub started_at: Instant,
}

#[derive(Default)]
pub struct MockModel {
    scripts: Mutex<HashMap<StepName, Script>>,
    latencies: HashMap<StepName, Duration>,
    calls: Mutex<Vec<CallRecord>>,
    completed: Mutex<Vec<StepName>>,
    spans: Mutex<Vec<(StepName, Instant, Instant)>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl MockModel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail every attempt of `step`
    pub fn failing(mut self, step: StepName, failure: Failure) -> Self {
        self.scripts.get_mut().unwrap().insert(
            step,
            Script {
                failure,
                remaining: None,
            },
        );
        self
    }

    /// Fail the first `times` attempts of `step`
    pub fn failing_times(mut self, step: StepName, failure: Failure, times: u32) -> Self {
        self.scripts.get_mut().unwrap().insert(
            step,
            Script {
                failure,
                remaining: Some(times),
            },
        );
        self
    }

    /// Make every call to `step` take `latency`
    pub fn with_latency(mut self, step: StepName, latency: Duration) -> Self {
        self.latencies.insert(step, latency);
        self
    }

    pub fn shared(self) -> Arc<Self> {
        Arc::new(self)
    }

    pub fn calls(&self) -> Vec<CallRecord> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_order(&self) -> Vec<StepName> {
        self.calls().into_iter().map(|c| c.step).collect()
    }

    pub fn call_count(&self, step: StepName) -> usize {
        self.calls().iter().filter(|c| c.step == step).count()
    }

    pub fn requests_for(&self, step: StepName) -> Vec<CompletionRequest> {
        self.calls()
            .into_iter()
            .filter(|c| c.step == step)
            .map(|c| c.request)
            .collect()
    }

    /// Steps whose call ran to the end, failures included
    pub fn completed(&self) -> Vec<StepName> {
        self.completed.lock().unwrap().clone()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    /// Largest number of calls to `steps` that were running at the same time
    pub fn max_overlap(&self, steps: &[StepName]) -> usize {
        let mut events: Vec<(Instant, i32)> = Vec::new();
        for (step, start, end) in self.spans.lock().unwrap().iter() {
            if steps.contains(step) {
                events.push((*start, 1));
                events.push((*end, -1));
            }
        }
        // A call ending at the same instant another starts does not overlap it
        events.sort();

        let mut current = 0i32;
        let mut max = 0i32;
        for (_, delta) in events {
            current += delta;
            max = max.max(current);
        }
        max as usize
    }

    fn classify(request: &CompletionRequest) -> StepName {
        StepName::ALL
            .into_iter()
            .find(|step| request.system_prompt.starts_with(prompts::role_line(*step)))
            .unwrap_or_else(|| panic!("unrecognized system prompt: {}", request.system_prompt))
    }

    fn scripted_failure(&self, step: StepName) -> Option<LlmError> {
        let mut scripts = self.scripts.lock().unwrap();
        let script = scripts.get_mut(&step)?;
        match &mut script.remaining {
            None => Some(script.failure.error(step)),
            Some(0) => None,
            Some(n) => {
                *n -= 1;
                Some(script.failure.error(step))
            }
        }
    }

    fn reply(step: StepName) -> String {
        match step {
            StepName::Deconstruct => {
                r#"{"intent": "explain", "audience": "unspecified", "format": "unspecified"}"#.to_string()
            }
            StepName::DiagnosePreliminary => "Audience and length are not stated.".to_string(),
            StepName::DiagnoseFull => "1. No target audience\n2. No output length".to_string(),
            StepName::Design => format!(
                "Optimized Prompt:\n{}\n\nExplanation:\nAdded audience and length.",
                OPTIMIZED_TEXT
            ),
            StepName::Sample => "Quantum computers use qubits...".to_string(),
            StepName::Evaluate => "Overall score: 84/100\nClarity: 22/25".to_string(),
        }
    }
}

struct InFlight<'a> {
    model: &'a MockModel,
    step: StepName,
    started_at: Instant,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.model.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.model
            .spans
            .lock()
            .unwrap()
            .push((self.step, self.started_at, Instant::now()));
    }
}

#[async_trait]
impl CompletionModel for MockModel {
    async fn complete(&self, request: CompletionRequest) -> llm::Result<CompletionResponse> {
        let step = Self::classify(&request);
        let started_at = Instant::now();
        self.calls.lock().unwrap().push(CallRecord {
            step,
            request,
            started_at,
        });

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        let _guard = InFlight {
            model: self,
            step,
            started_at,
        };

        if let Some(latency) = self.latencies.get(&step) {
            tokio::time::sleep(*latency).await;
        }

        self.completed.lock().unwrap().push(step);

        if let Some(error) = self.scripted_failure(step) {
            return Err(error);
        }

        Ok(CompletionResponse::new(Self::reply(step), "mock-model").with_usage(UsageMetadata::new(50, 25)))
    }

    fn model_name(&self) -> &str {
        "mock-model"
    }
}
