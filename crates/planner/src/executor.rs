//! The plan executor: runs an `ActionPlan` to completion under its
//! declared execution model, honoring per-step error policy, timeouts,
//! cooperative cancellation, and replanning.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use runtime_contracts::{ActionPlan, ExecutionModel, PlanExecutionResult, PlanStep, StepErrorPolicy, StepOutcome};
use serde_json::{Map, Value};
use tracing::{info, instrument, warn};

use crate::action_invoker::ActionInvoker;
use crate::context::{AbortHandle, AbortSignal, ActionContext};
use crate::error::StepError;
use crate::generation::{generate_plan, PlanConstraints};
use crate::model_caller::PlanModelCaller;
use crate::working_memory::WorkingMemory;

/// How many times a plan may replan itself before the executor gives up
/// and returns whatever has been accomplished so far. Unbounded
/// replanning is not a thing the source exhibits; this guards against a
/// step that always requests replanning from spinning forever.
const MAX_REPLAN_DEPTH: u32 = 3;

pub struct PlanExecutor {
    invoker: Arc<dyn ActionInvoker>,
    model: Arc<dyn PlanModelCaller>,
}

impl PlanExecutor {
    pub fn new(invoker: Arc<dyn ActionInvoker>, model: Arc<dyn PlanModelCaller>) -> Self {
        Self { invoker, model }
    }

    /// Execute `plan` to completion (including any replanning it triggers
    /// along the way), seeding working memory from `initial_memory`.
    #[instrument(skip(self, plan, initial_memory), fields(plan_id = %plan.id))]
    pub async fn execute(
        &self,
        plan: ActionPlan,
        initial_memory: HashMap<String, Value>,
    ) -> PlanExecutionResult {
        let working_memory = Arc::new(WorkingMemory::from_map(initial_memory));
        let (abort_handle, abort_signal) = AbortHandle::new();
        self.run(plan, working_memory, abort_signal, &abort_handle, 0).await
    }

    /// An externally created abort handle, for callers that want to cancel
    /// a running plan (e.g. the runtime reacting to a user cancel).
    pub fn new_abort_handle() -> (AbortHandle, AbortSignal) {
        AbortHandle::new()
    }

    async fn run(
        &self,
        plan: ActionPlan,
        working_memory: Arc<WorkingMemory>,
        abort_signal: AbortSignal,
        abort_handle: &AbortHandle,
        replan_depth: u32,
    ) -> PlanExecutionResult {
        let mut completed: Vec<StepOutcome> = Vec::new();
        let mut errors: Vec<String> = Vec::new();
        let mut replan_request: Option<(String, Vec<String>)> = None; // (step_id, step ids that wanted replanning)

        if plan.steps.is_empty() {
            return PlanExecutionResult {
                success: true,
                completed_steps: Vec::new(),
                errors: Vec::new(),
                final_values: Map::new(),
                working_memory_snapshot: working_memory.snapshot().into_iter().collect(),
                adapted: replan_depth > 0,
            };
        }

        let success = match plan.execution_model {
            ExecutionModel::Sequential => {
                self.run_sequential(&plan, &working_memory, &abort_signal, &mut completed, &mut errors, &mut replan_request)
                    .await
            }
            ExecutionModel::Parallel => {
                self.run_parallel(&plan, &working_memory, &abort_signal, &mut completed, &mut errors)
                    .await
            }
            ExecutionModel::Dag => {
                self.run_dag(&plan, &working_memory, &abort_signal, &mut completed, &mut errors, &mut replan_request)
                    .await
            }
        };

        if let Some((requesting_step, _)) = replan_request {
            if replan_depth < MAX_REPLAN_DEPTH {
                info!(step_id = %requesting_step, depth = replan_depth, "step requested replanning");
                let amended_goal = format!(
                    "{} (continuing after step '{}' requested replanning; prior progress: {:?})",
                    plan.goal,
                    requesting_step,
                    completed.iter().map(|o| o.step_id.clone()).collect::<Vec<_>>()
                );
                match generate_plan(&amended_goal, &PlanConstraints::default(), self.invoker.as_ref(), self.model.as_ref())
                    .await
                {
                    Ok(mut next_plan) => {
                        namespace_step_ids(&mut next_plan, replan_depth + 1);
                        let mut result = Box::pin(self.run(
                            next_plan,
                            Arc::clone(&working_memory),
                            abort_signal,
                            abort_handle,
                            replan_depth + 1,
                        ))
                        .await;
                        let mut all_completed = completed;
                        all_completed.append(&mut result.completed_steps);
                        result.completed_steps = all_completed;
                        result.errors = {
                            errors.extend(result.errors);
                            errors
                        };
                        result.adapted = true;
                        return result;
                    }
                    Err(e) => {
                        warn!(error = %e, "replanning failed, returning partial progress");
                        errors.push(format!("replanning failed: {e}"));
                    }
                }
            } else {
                warn!(depth = replan_depth, "max replan depth reached, returning partial progress");
                errors.push("max replan depth reached".into());
            }
        }

        let final_values = merge_final_values(&completed);
        PlanExecutionResult {
            success: success && errors.is_empty(),
            completed_steps: completed,
            errors,
            final_values,
            working_memory_snapshot: working_memory.snapshot().into_iter().collect(),
            adapted: replan_depth > 0,
        }
    }

    async fn dispatch_step(
        &self,
        plan_id: &str,
        step: &PlanStep,
        working_memory: &Arc<WorkingMemory>,
        previous_results: Vec<StepOutcome>,
        abort_signal: &AbortSignal,
    ) -> Result<StepOutcome, StepError> {
        if abort_signal.is_aborted() {
            return Err(StepError::Cancelled { step_id: step.id.clone() });
        }

        let ctx = ActionContext::new(
            plan_id.to_string(),
            step.id.clone(),
            Arc::clone(working_memory),
            previous_results,
            abort_signal.clone(),
        );

        let invoke_fut = self.invoker.invoke(&step.action_name, &step.params, &ctx);

        let invoke_result = if let Some(timeout_ms) = step.timeout_ms {
            match tokio::time::timeout(Duration::from_millis(timeout_ms), invoke_fut).await {
                Ok(inner) => inner,
                Err(_) => {
                    return Err(StepError::Timeout {
                        step_id: step.id.clone(),
                        timeout_ms,
                    })
                }
            }
        } else {
            invoke_fut.await
        };

        let result = invoke_result.map_err(|e| StepError::HandlerThrew {
            step_id: step.id.clone(),
            message: e.to_string(),
        })?;

        if ctx.replanning_requested() {
            return Err(StepError::ReplanRequested { step_id: step.id.clone() });
        }

        Ok(StepOutcome {
            step_id: step.id.clone(),
            success: result.success,
            values: result.values,
            data: result.data,
            text: result.text,
            error: result.error,
            skipped: false,
        })
    }

    async fn run_sequential(
        &self,
        plan: &ActionPlan,
        working_memory: &Arc<WorkingMemory>,
        abort_signal: &AbortSignal,
        completed: &mut Vec<StepOutcome>,
        errors: &mut Vec<String>,
        replan_request: &mut Option<(String, Vec<String>)>,
    ) -> bool {
        for step in &plan.steps {
            match self
                .dispatch_step(&plan.id, step, working_memory, completed.clone(), abort_signal)
                .await
            {
                Ok(outcome) => {
                    let step_failed = !outcome.success;
                    if step_failed {
                        errors.push(format!("step {} failed: {:?}", step.id, outcome.error));
                    }
                    completed.push(outcome);
                    if step_failed && step.on_error == StepErrorPolicy::Abort {
                        return false;
                    }
                }
                Err(StepError::ReplanRequested { step_id }) => {
                    *replan_request = Some((step_id, Vec::new()));
                    return errors.is_empty();
                }
                Err(e) => {
                    errors.push(e.to_string());
                    match step.on_error {
                        StepErrorPolicy::Abort => return false,
                        StepErrorPolicy::Continue => {
                            completed.push(failed_outcome(&step.id, &e));
                        }
                        StepErrorPolicy::Skip => {
                            completed.push(skipped_outcome(&step.id));
                        }
                    }
                }
            }
        }
        errors.is_empty()
    }

    async fn run_parallel(
        &self,
        plan: &ActionPlan,
        working_memory: &Arc<WorkingMemory>,
        abort_signal: &AbortSignal,
        completed: &mut Vec<StepOutcome>,
        errors: &mut Vec<String>,
    ) -> bool {
        let futures = plan.steps.iter().map(|step| {
            self.dispatch_step(&plan.id, step, working_memory, Vec::new(), abort_signal)
        });
        let results = join_all(futures).await;

        let mut success = true;
        for (step, result) in plan.steps.iter().zip(results.into_iter()) {
            match result {
                Ok(outcome) => {
                    if !outcome.success {
                        success = false;
                        errors.push(format!("step {} failed: {:?}", step.id, outcome.error));
                    }
                    completed.push(outcome);
                }
                Err(e) => {
                    errors.push(e.to_string());
                    match step.on_error {
                        StepErrorPolicy::Abort => success = false,
                        StepErrorPolicy::Continue => {
                            completed.push(failed_outcome(&step.id, &e));
                        }
                        StepErrorPolicy::Skip => {
                            completed.push(skipped_outcome(&step.id));
                        }
                    }
                }
            }
        }
        success
    }

    async fn run_dag(
        &self,
        plan: &ActionPlan,
        working_memory: &Arc<WorkingMemory>,
        abort_signal: &AbortSignal,
        completed: &mut Vec<StepOutcome>,
        errors: &mut Vec<String>,
        replan_request: &mut Option<(String, Vec<String>)>,
    ) -> bool {
        let by_id: HashMap<&str, &PlanStep> = plan.steps.iter().map(|s| (s.id.as_str(), s)).collect();
        let mut in_degree: HashMap<&str, usize> =
            plan.steps.iter().map(|s| (s.id.as_str(), s.depends_on.len())).collect();
        let mut dependents: HashMap<&str, Vec<&str>> = HashMap::new();
        for step in &plan.steps {
            for dep in &step.depends_on {
                dependents.entry(dep.as_str()).or_default().push(step.id.as_str());
            }
        }

        let mut skipped: HashSet<String> = HashSet::new();
        let mut frontier: Vec<&str> = in_degree.iter().filter(|(_, &d)| d == 0).map(|(id, _)| *id).collect();
        let mut overall_success = true;
        let mut abort_requested = false;

        while !frontier.is_empty() {
            let batch = std::mem::take(&mut frontier);
            let previous_snapshot: Vec<StepOutcome> = completed.clone();

            let futures = batch.iter().map(|id| {
                let step = by_id[id];
                self.dispatch_step(&plan.id, step, working_memory, previous_snapshot.clone(), abort_signal)
            });
            let results = join_all(futures).await;

            for (id, result) in batch.iter().zip(results.into_iter()) {
                let step = by_id[id];
                let outcome = match result {
                    Ok(outcome) => {
                        if !outcome.success {
                            overall_success = false;
                            errors.push(format!("step {} failed: {:?}", step.id, outcome.error));
                            match step.on_error {
                                StepErrorPolicy::Abort => abort_requested = true,
                                StepErrorPolicy::Continue => {}
                                StepErrorPolicy::Skip => mark_descendants_skipped(id, &dependents, &mut skipped),
                            }
                        }
                        outcome
                    }
                    Err(StepError::ReplanRequested { step_id }) => {
                        *replan_request = Some((step_id, Vec::new()));
                        return overall_success;
                    }
                    Err(e) => {
                        errors.push(e.to_string());
                        match step.on_error {
                            StepErrorPolicy::Abort => {
                                overall_success = false;
                                abort_requested = true;
                                failed_outcome(&step.id, &e)
                            }
                            StepErrorPolicy::Continue => failed_outcome(&step.id, &e),
                            StepErrorPolicy::Skip => {
                                mark_descendants_skipped(id, &dependents, &mut skipped);
                                skipped_outcome(&step.id)
                            }
                        }
                    }
                };
                completed.push(outcome);

                if let Some(deps) = dependents.get(*id) {
                    for &dependent in deps {
                        if skipped.contains(dependent) {
                            continue;
                        }
                        let deg = in_degree.get_mut(dependent).expect("dependent tracked in in_degree");
                        *deg -= 1;
                        if *deg == 0 {
                            frontier.push(dependent);
                        }
                    }
                }
            }

            if abort_requested {
                break;
            }
        }

        for id in skipped {
            if !completed.iter().any(|o| o.step_id == id) {
                completed.push(skipped_outcome(&id));
            }
        }

        overall_success
    }
}

fn mark_descendants_skipped<'a>(
    root: &'a str,
    dependents: &HashMap<&'a str, Vec<&'a str>>,
    skipped: &mut HashSet<String>,
) {
    let mut stack = vec![root];
    while let Some(id) = stack.pop() {
        if let Some(deps) = dependents.get(id) {
            for &dependent in deps {
                if skipped.insert(dependent.to_string()) {
                    stack.push(dependent);
                }
            }
        }
    }
}

fn failed_outcome(step_id: &str, error: &StepError) -> StepOutcome {
    StepOutcome {
        step_id: step_id.to_string(),
        success: false,
        values: Map::new(),
        data: Map::new(),
        text: None,
        error: Some(error.to_string()),
        skipped: false,
    }
}

fn skipped_outcome(step_id: &str) -> StepOutcome {
    StepOutcome {
        step_id: step_id.to_string(),
        success: false,
        values: Map::new(),
        data: Map::new(),
        text: None,
        error: None,
        skipped: true,
    }
}

fn merge_final_values(completed: &[StepOutcome]) -> Map<String, Value> {
    let mut out = Map::new();
    for outcome in completed {
        for (k, v) in &outcome.values {
            out.insert(k.clone(), v.clone());
        }
    }
    out
}

fn namespace_step_ids(plan: &mut ActionPlan, depth: u32) {
    let prefix = format!("replan{depth}::");
    let mut rename = HashMap::new();
    for step in &mut plan.steps {
        let new_id = format!("{prefix}{}", step.id);
        rename.insert(step.id.clone(), new_id.clone());
        step.id = new_id;
    }
    for step in &mut plan.steps {
        for dep in &mut step.depends_on {
            if let Some(renamed) = rename.get(dep) {
                *dep = renamed.clone();
            }
        }
    }
}
