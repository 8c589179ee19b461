//! Abort signal and per-step action context.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::watch;

use runtime_contracts::{PlanStep, StepOutcome};

use crate::working_memory::WorkingMemory;

/// Cooperative cancellation signal shared by every step in a plan.
///
/// Handlers check it at suspension points (around I/O or model calls);
/// nothing preempts them. Modeled as an explicit value, never as
/// exceptions-for-control-flow.
#[derive(Clone)]
pub struct AbortSignal {
    rx: watch::Receiver<bool>,
}

impl AbortSignal {
    pub fn is_aborted(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once the signal fires, or immediately if it already has.
    pub async fn aborted(&mut self) {
        if self.is_aborted() {
            return;
        }
        let _ = self.rx.changed().await;
    }
}

/// Owning half of an [`AbortSignal`]; held by the executor, not by steps.
pub struct AbortHandle {
    tx: watch::Sender<bool>,
}

impl AbortHandle {
    pub fn new() -> (Self, AbortSignal) {
        let (tx, rx) = watch::channel(false);
        (Self { tx }, AbortSignal { rx })
    }

    pub fn abort(&self) {
        let _ = self.tx.send(true);
    }
}

/// The per-step context every action handler receives when invoked under
/// the planner.
pub struct ActionContext {
    pub plan_id: String,
    pub step_id: String,
    pub working_memory: Arc<WorkingMemory>,
    previous_results: Vec<StepOutcome>,
    pub abort_signal: AbortSignal,
    replan_requested: std::sync::atomic::AtomicBool,
}

impl ActionContext {
    pub fn new(
        plan_id: impl Into<String>,
        step_id: impl Into<String>,
        working_memory: Arc<WorkingMemory>,
        previous_results: Vec<StepOutcome>,
        abort_signal: AbortSignal,
    ) -> Self {
        Self {
            plan_id: plan_id.into(),
            step_id: step_id.into(),
            working_memory,
            previous_results,
            abort_signal,
            replan_requested: std::sync::atomic::AtomicBool::new(false),
        }
    }

    pub fn previous_results(&self) -> &[StepOutcome] {
        &self.previous_results
    }

    pub fn get_previous_result(&self, step_id: &str) -> Option<&StepOutcome> {
        self.previous_results.iter().find(|r| r.step_id == step_id)
    }

    pub fn update_memory(&self, key: impl Into<String>, value: Value) {
        self.working_memory.set(key, value);
    }

    pub fn get_memory(&self, key: &str) -> Option<Value> {
        self.working_memory.get(key)
    }

    /// Mark that this step believes the plan is no longer viable. The
    /// executor finishes the step, then regenerates a plan from the
    /// accumulated context, carrying working memory forward.
    pub fn request_replanning(&self) {
        self.replan_requested
            .store(true, std::sync::atomic::Ordering::SeqCst);
    }

    pub fn replanning_requested(&self) -> bool {
        self.replan_requested.load(std::sync::atomic::Ordering::SeqCst)
    }
}

/// Build the working-memory values a step can see from the prior step's
/// results, merging `values` the way sequential execution threads state
/// forward into subsequent providers/model calls.
pub fn merge_previous_values(outcome: &StepOutcome, into: &mut HashMap<String, Value>) {
    for (k, v) in &outcome.values {
        into.insert(k.clone(), v.clone());
    }
}

pub(crate) fn step_requires(step: &PlanStep) -> &[String] {
    &step.depends_on
}
