//! Turns a goal plus the registered actions into a validated `ActionPlan`
//! by prompting a model handler, with one re-prompt on a malformed or
//! invalid response before falling back to single-action mode.

use runtime_contracts::{ActionDescriptor, ActionPlan, ExecutionModel, PlanStep};
use serde::Deserialize;
use tracing::{info, warn};

use crate::action_invoker::ActionInvoker;
use crate::error::PlanError;
use crate::model_caller::PlanModelCaller;
use crate::validation::validate_plan;

/// Constraints a caller may place on the generated plan.
#[derive(Debug, Clone, Default)]
pub struct PlanConstraints {
    pub max_steps: Option<usize>,
    pub preferred_execution_model: Option<ExecutionModel>,
    pub optimize_for: Option<String>,
}

/// The shape the model is asked to emit. Field names match the wire
/// contract so `serde_json::from_str` on the model's raw JSON output
/// (after stripping any surrounding prose) works without a custom parser.
#[derive(Debug, Deserialize)]
struct RawPlan {
    #[serde(rename = "executionModel")]
    execution_model: ExecutionModel,
    steps: Vec<RawStep>,
}

#[derive(Debug, Deserialize)]
struct RawStep {
    id: String,
    #[serde(rename = "actionName")]
    action_name: String,
    #[serde(default)]
    params: serde_json::Map<String, serde_json::Value>,
    #[serde(default, rename = "dependsOn")]
    depends_on: Vec<String>,
    #[serde(default, rename = "onError")]
    on_error: runtime_contracts::StepErrorPolicy,
    #[serde(default, rename = "timeoutMs")]
    timeout_ms: Option<u64>,
}

pub async fn generate_plan(
    goal: &str,
    constraints: &PlanConstraints,
    invoker: &dyn ActionInvoker,
    model: &dyn PlanModelCaller,
) -> Result<ActionPlan, PlanError> {
    let prompt = build_prompt(goal, constraints, &invoker.available_actions());

    match try_generate_once(goal, &prompt, invoker, model).await {
        Ok(plan) => Ok(plan),
        Err(first_err) => {
            warn!(error = %first_err, "plan generation failed, re-prompting once");
            try_generate_once(goal, &prompt, invoker, model)
                .await
                .map_err(|second_err| {
                    warn!(error = %second_err, "plan generation failed twice, falling back to single action mode");
                    PlanError::GenerationFailed(second_err.to_string())
                })
        }
    }
}

async fn try_generate_once(
    goal: &str,
    prompt: &str,
    invoker: &dyn ActionInvoker,
    model: &dyn PlanModelCaller,
) -> Result<ActionPlan, PlanError> {
    let raw_text = model
        .generate_plan_text(prompt)
        .await
        .map_err(|e| PlanError::GenerationFailed(e.to_string()))?;

    let json_slice = extract_json_object(&raw_text)
        .ok_or_else(|| PlanError::GenerationFailed("no JSON object found in model output".into()))?;

    let raw: RawPlan = serde_json::from_str(json_slice)
        .map_err(|e| PlanError::GenerationFailed(format!("malformed plan JSON: {e}")))?;

    let steps = raw
        .steps
        .into_iter()
        .map(|s| {
            let mut step = PlanStep::new(s.id, s.action_name).on_error(s.on_error);
            step.params = s.params;
            step.timeout_ms = s.timeout_ms;
            for dep in s.depends_on {
                step = step.depends_on(dep);
            }
            step
        })
        .collect();

    let plan = ActionPlan::new(goal, raw.execution_model).with_steps(steps);
    validate_plan(&plan, invoker)?;

    info!(plan_id = %plan.id, step_count = plan.steps.len(), "plan generated");
    Ok(plan)
}

/// Lenient extraction: models wrap JSON in prose or code fences more
/// often than not. Take the outermost balanced `{...}` span.
fn extract_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0i32;
    for (offset, ch) in text[start..].char_indices() {
        match ch {
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + offset + ch.len_utf8()]);
                }
            }
            _ => {}
        }
    }
    None
}

fn build_prompt(goal: &str, constraints: &PlanConstraints, actions: &[ActionDescriptor]) -> String {
    let mut prompt = String::new();
    prompt.push_str("You are planning a sequence of actions to accomplish a goal.\n\n");
    prompt.push_str(&format!("Goal: {goal}\n\n"));
    prompt.push_str("Available actions:\n");
    for action in actions {
        prompt.push_str(&format!(
            "- {} : {} (provides: {:?}, requires: {:?})\n",
            action.name, action.description, action.effects.provides, action.effects.requires
        ));
    }
    if let Some(max) = constraints.max_steps {
        prompt.push_str(&format!("\nUse at most {max} steps.\n"));
    }
    if let Some(model) = constraints.preferred_execution_model {
        prompt.push_str(&format!("Prefer executionModel: {model:?}.\n"));
    }
    if let Some(hint) = &constraints.optimize_for {
        prompt.push_str(&format!("Optimize for: {hint}.\n"));
    }
    prompt.push_str(
        "\nRespond with a single JSON object: \
         {\"executionModel\": \"sequential\"|\"parallel\"|\"dag\", \"steps\": \
         [{\"id\": str, \"actionName\": str, \"params\": object, \"dependsOn\": [str], \
         \"onError\": \"abort\"|\"continue\"|\"skip\", \"timeoutMs\": number|null}]}\n",
    );
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extract_json_object_ignores_surrounding_prose() {
        let text = "Sure, here is the plan:\n```json\n{\"a\":{\"b\":1}}\n```\nLet me know!";
        assert_eq!(extract_json_object(text), Some("{\"a\":{\"b\":1}}"));
    }

    #[test]
    fn extract_json_object_returns_none_without_braces() {
        assert_eq!(extract_json_object("no json here"), None);
    }
}
