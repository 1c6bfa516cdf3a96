//! Workflow orchestration module
//!
//! Runs the five-stage optimization pipeline and aggregates the per-stage
//! outcomes into a [`WorkflowResult`].

pub mod orchestrator;
pub mod result;

pub use orchestrator::{
    WorkflowOrchestrator, DECONSTRUCTION_PLACEHOLDER, DIAGNOSIS_PLACEHOLDER, SAMPLE_PLACEHOLDER,
};
pub use result::{ModeUsed, StageResults, StepError, StepOutput, StepResult, WorkflowResult};
