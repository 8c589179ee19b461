//! Error taxonomy for plan generation, validation, and execution.

use uuid::Uuid;

/// Errors raised while generating or validating a plan.
#[derive(Debug, thiserror::Error)]
pub enum PlanError {
    #[error("plan generation failed after retry: {0}")]
    GenerationFailed(String),

    #[error("plan validation failed: {0}")]
    ValidationFailed(String),

    #[error("plan has a dependency cycle involving steps: {0:?}")]
    Cycle(Vec<String>),

    #[error("step {step_id} references unknown action {action_name}")]
    UnknownAction { step_id: String, action_name: String },

    #[error("step {step_id} depends on unknown step {dependency_id}")]
    UnknownDependency {
        step_id: String,
        dependency_id: String,
    },

    #[error("parallel execution model does not allow dependsOn (step {0})")]
    ParallelWithDependencies(String),

    #[error("no model handler available to generate a plan")]
    NoModelHandler,
}

/// Errors raised while executing a single step.
#[derive(Debug, Clone, thiserror::Error)]
pub enum StepError {
    #[error("step {step_id} handler error: {message}")]
    HandlerThrew { step_id: String, message: String },

    #[error("step {step_id} timed out after {timeout_ms}ms")]
    Timeout { step_id: String, timeout_ms: u64 },

    #[error("step {step_id} cancelled")]
    Cancelled { step_id: String },

    #[error("step {step_id} requested replanning")]
    ReplanRequested { step_id: String },
}

impl StepError {
    pub fn step_id(&self) -> &str {
        match self {
            StepError::HandlerThrew { step_id, .. }
            | StepError::Timeout { step_id, .. }
            | StepError::Cancelled { step_id, .. }
            | StepError::ReplanRequested { step_id, .. } => step_id,
        }
    }
}

/// Errors raised by the task scheduler.
#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    #[error("no worker registered for task name {0}")]
    NoWorker(String),

    #[error("task {0} not found")]
    TaskNotFound(Uuid),

    #[error("worker for task {task_id} errored: {message}")]
    WorkerFailed { task_id: Uuid, message: String },
}
