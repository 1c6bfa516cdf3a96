//! Workflow result types
//!
//! A [`WorkflowResult`] always carries exactly one [`StepResult`] per
//! [`Stage`], in pipeline order. Each step result serializes as
//! `{"ok": true, "value": {...}}` or `{"ok": false, "error": {...}}`.

use crate::agent::{Stage, StepName};
use crate::router::PromptCategory;
use crate::OptimizerError;
use chrono::{DateTime, Utc};
use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};
use std::fmt;
use uuid::Uuid;

/// Successful step output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepOutput {
    pub content: String,

    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub metadata: Map<String, Value>,
}

impl StepOutput {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            metadata: Map::new(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    pub fn metadata_str(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).and_then(Value::as_str)
    }
}

/// Failed step description
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepError {
    /// Stable machine-readable kind (`exhausted_retries`, `call_rejected`,
    /// `timeout`, `cancelled`, ...)
    pub kind: String,
    pub message: String,
}

impl StepError {
    pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            message: message.into(),
        }
    }

    pub fn timeout(step: StepName) -> Self {
        Self::from(&OptimizerError::Timeout(format!(
            "{} did not finish before the workflow deadline",
            step
        )))
    }

    pub fn cancelled(message: impl Into<String>) -> Self {
        Self::new("cancelled", message)
    }
}

impl From<&OptimizerError> for StepError {
    fn from(error: &OptimizerError) -> Self {
        Self::new(error.kind(), error.to_string())
    }
}

impl fmt::Display for StepError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

/// Outcome of one stage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(into = "TaggedStepResult", try_from = "TaggedStepResult")]
pub enum StepResult {
    Ok(StepOutput),
    Err(StepError),
}

impl StepResult {
    pub fn is_ok(&self) -> bool {
        matches!(self, StepResult::Ok(_))
    }

    pub fn output(&self) -> Option<&StepOutput> {
        match self {
            StepResult::Ok(output) => Some(output),
            StepResult::Err(_) => None,
        }
    }

    pub fn error(&self) -> Option<&StepError> {
        match self {
            StepResult::Ok(_) => None,
            StepResult::Err(error) => Some(error),
        }
    }

    pub fn into_output(self) -> Option<StepOutput> {
        match self {
            StepResult::Ok(output) => Some(output),
            StepResult::Err(_) => None,
        }
    }

    pub fn into_error(self) -> Option<StepError> {
        match self {
            StepResult::Ok(_) => None,
            StepResult::Err(error) => Some(error),
        }
    }

    /// Output text, if the stage succeeded
    pub fn content(&self) -> Option<&str> {
        self.output().map(|o| o.content.as_str())
    }
}

#[derive(Serialize, Deserialize)]
struct TaggedStepResult {
    ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    value: Option<StepOutput>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    error: Option<StepError>,
}

impl From<StepResult> for TaggedStepResult {
    fn from(result: StepResult) -> Self {
        match result {
            StepResult::Ok(value) => Self {
                ok: true,
                value: Some(value),
                error: None,
            },
            StepResult::Err(error) => Self {
                ok: false,
                value: None,
                error: Some(error),
            },
        }
    }
}

impl TryFrom<TaggedStepResult> for StepResult {
    type Error = String;

    fn try_from(tagged: TaggedStepResult) -> Result<Self, Self::Error> {
        match (tagged.ok, tagged.value, tagged.error) {
            (true, Some(value), None) => Ok(StepResult::Ok(value)),
            (false, None, Some(error)) => Ok(StepResult::Err(error)),
            (ok, _, _) => Err(format!(
                "step result with ok={} must carry exactly one of `value` or `error`",
                ok
            )),
        }
    }
}

/// How a run was executed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ModeUsed {
    #[serde(rename = "parallel")]
    Parallel,
    #[serde(rename = "sequential")]
    Sequential,
    /// Parallel phase failed and the pipeline was rerun sequentially
    #[serde(rename = "sequential (fallback)")]
    SequentialFallback,
}

impl ModeUsed {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModeUsed::Parallel => "parallel",
            ModeUsed::Sequential => "sequential",
            ModeUsed::SequentialFallback => "sequential (fallback)",
        }
    }
}

impl fmt::Display for ModeUsed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Stage results in insertion order, at most one per stage
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StageResults {
    entries: Vec<(Stage, StepResult)>,
}

impl StageResults {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a stage result, replacing any earlier one for that stage
    pub fn insert(&mut self, stage: Stage, result: StepResult) {
        match self.entries.iter_mut().find(|(s, _)| *s == stage) {
            Some(entry) => entry.1 = result,
            None => self.entries.push((stage, result)),
        }
    }

    pub fn get(&self, stage: Stage) -> Option<&StepResult> {
        self.entries.iter().find(|(s, _)| *s == stage).map(|(_, r)| r)
    }

    pub fn contains(&self, stage: Stage) -> bool {
        self.get(stage).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Stage, &StepResult)> {
        self.entries.iter().map(|(s, r)| (*s, r))
    }

    pub fn stages(&self) -> Vec<Stage> {
        self.entries.iter().map(|(s, _)| *s).collect()
    }

    /// Give every missing stage an error entry; returns the stages filled
    pub fn fill_missing(&mut self, reason: &str) -> Vec<Stage> {
        let missing: Vec<Stage> = Stage::ALL.into_iter().filter(|s| !self.contains(*s)).collect();
        for stage in &missing {
            self.entries.push((
                *stage,
                StepResult::Err(StepError::cancelled(format!("{} {}", stage, reason))),
            ));
        }
        missing
    }
}

impl Serialize for StageResults {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (stage, result) in &self.entries {
            map.serialize_entry(stage, result)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for StageResults {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct StageResultsVisitor;

        impl<'de> Visitor<'de> for StageResultsVisitor {
            type Value = StageResults;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of stage names to step results")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
                let mut results = StageResults::new();
                while let Some((stage, result)) = access.next_entry::<Stage, StepResult>()? {
                    results.insert(stage, result);
                }
                Ok(results)
            }
        }

        deserializer.deserialize_map(StageResultsVisitor)
    }
}

/// Aggregate result of one workflow run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowResult {
    pub run_id: Uuid,
    pub original_prompt: String,
    pub category: PromptCategory,
    pub mode_used: ModeUsed,
    pub stages: StageResults,

    /// Early notes from the parallel phase, fed into the full diagnosis
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preliminary_diagnosis: Option<StepResult>,

    pub non_fatal_errors: Vec<String>,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
}

impl WorkflowResult {
    pub fn stage(&self, stage: Stage) -> Option<&StepResult> {
        self.stages.get(stage)
    }

    /// Prompt extracted from the design stage
    pub fn optimized_prompt(&self) -> Option<&str> {
        self.stage(Stage::Design)?.output()?.metadata_str("optimized_prompt")
    }

    pub fn quality_score(&self) -> Option<u8> {
        self.stage(Stage::Evaluate)?
            .output()?
            .metadata
            .get("quality_score")?
            .as_u64()
            .map(|score| score.min(100) as u8)
    }

    pub fn succeeded_stages(&self) -> usize {
        self.stages.iter().filter(|(_, r)| r.is_ok()).count()
    }

    pub fn all_failed(&self) -> bool {
        self.succeeded_stages() == 0
    }

    pub fn duration_ms(&self) -> i64 {
        (self.completed_at - self.started_at).num_milliseconds()
    }
}
