//! Structural validation of a generated plan, independent of execution.

use std::collections::{HashMap, HashSet};

use runtime_contracts::{ActionPlan, ExecutionModel};

use crate::action_invoker::ActionInvoker;
use crate::error::PlanError;

/// Runs every check in order, rather than short-circuiting on the first
/// failure, so a caller retrying generation gets the complete picture in
/// a single re-prompt.
pub fn validate_plan(plan: &ActionPlan, invoker: &dyn ActionInvoker) -> Result<(), PlanError> {
    let step_ids: HashSet<&str> = plan.steps.iter().map(|s| s.id.as_str()).collect();

    for step in &plan.steps {
        if !invoker.has_action(&step.action_name) {
            return Err(PlanError::UnknownAction {
                step_id: step.id.clone(),
                action_name: step.action_name.clone(),
            });
        }
        for dep in &step.depends_on {
            if !step_ids.contains(dep.as_str()) {
                return Err(PlanError::UnknownDependency {
                    step_id: step.id.clone(),
                    dependency_id: dep.clone(),
                });
            }
        }
    }

    match plan.execution_model {
        ExecutionModel::Parallel => {
            if let Some(step) = plan.steps.iter().find(|s| !s.depends_on.is_empty()) {
                return Err(PlanError::ParallelWithDependencies(step.id.clone()));
            }
        }
        ExecutionModel::Sequential | ExecutionModel::Dag => {}
    }

    detect_cycle(plan)?;

    Ok(())
}

/// Kahn's algorithm: repeatedly peel off zero-in-degree nodes. Whatever
/// remains once no more can be peeled is the cycle.
fn detect_cycle(plan: &ActionPlan) -> Result<(), PlanError> {
    let mut in_degree: HashMap<&str, usize> = plan
        .steps
        .iter()
        .map(|s| (s.id.as_str(), s.depends_on.len()))
        .collect();
    let mut dependents: HashMap<&str, Vec<&str>> = HashMap::new();
    for step in &plan.steps {
        for dep in &step.depends_on {
            dependents.entry(dep.as_str()).or_default().push(step.id.as_str());
        }
    }

    let mut frontier: Vec<&str> = in_degree
        .iter()
        .filter(|(_, &deg)| deg == 0)
        .map(|(id, _)| *id)
        .collect();
    let mut resolved = 0;

    while let Some(id) = frontier.pop() {
        resolved += 1;
        if let Some(dependents_of_id) = dependents.get(id) {
            for &dependent in dependents_of_id {
                let deg = in_degree.get_mut(dependent).expect("dependent in in_degree map");
                *deg -= 1;
                if *deg == 0 {
                    frontier.push(dependent);
                }
            }
        }
    }

    if resolved < plan.steps.len() {
        let mut cycle: Vec<String> = in_degree
            .into_iter()
            .filter(|(_, deg)| *deg > 0)
            .map(|(id, _)| id.to_string())
            .collect();
        cycle.sort();
        return Err(PlanError::Cycle(cycle));
    }

    Ok(())
}
