// Action plans - the structure the planner generates and the executor runs

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionModel {
    Sequential,
    Parallel,
    Dag,
}

/// What to do when a step errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum StepErrorPolicy {
    #[default]
    Abort,
    Continue,
    Skip,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanStep {
    pub id: String,
    pub action_name: String,
    #[serde(default)]
    pub params: Map<String, Value>,
    #[serde(default)]
    pub depends_on: Vec<String>,
    #[serde(default)]
    pub on_error: StepErrorPolicy,
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

impl PlanStep {
    pub fn new(id: impl Into<String>, action_name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            action_name: action_name.into(),
            params: Map::new(),
            depends_on: Vec::new(),
            on_error: StepErrorPolicy::default(),
            timeout_ms: None,
        }
    }

    pub fn depends_on(mut self, step_id: impl Into<String>) -> Self {
        self.depends_on.push(step_id.into());
        self
    }

    pub fn on_error(mut self, policy: StepErrorPolicy) -> Self {
        self.on_error = policy;
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionPlan {
    pub id: String,
    pub goal: String,
    pub steps: Vec<PlanStep>,
    pub execution_model: ExecutionModel,
}

impl ActionPlan {
    pub fn new(goal: impl Into<String>, execution_model: ExecutionModel) -> Self {
        Self {
            id: uuid::Uuid::now_v7().to_string(),
            goal: goal.into(),
            steps: Vec::new(),
            execution_model,
        }
    }

    pub fn with_steps(mut self, steps: Vec<PlanStep>) -> Self {
        self.steps = steps;
        self
    }

    pub fn step_ids(&self) -> HashSet<&str> {
        self.steps.iter().map(|s| s.id.as_str()).collect()
    }
}

/// Outcome of executing one step, chronologically addressable and indexed
/// by step id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepOutcome {
    pub step_id: String,
    pub success: bool,
    pub values: Map<String, Value>,
    pub data: Map<String, Value>,
    pub text: Option<String>,
    pub error: Option<String>,
    pub skipped: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanExecutionResult {
    pub success: bool,
    pub completed_steps: Vec<StepOutcome>,
    pub errors: Vec<String>,
    pub final_values: Map<String, Value>,
    pub working_memory_snapshot: Map<String, Value>,
    pub adapted: bool,
}
