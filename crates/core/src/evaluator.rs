//! The Evaluator trait: a post-response hook for memory formation.

use async_trait::async_trait;
use runtime_contracts::{ActionExample, ActionResult};
use tracing::warn;

use crate::runtime::Runtime;
use crate::state::State;
use crate::Message;

#[async_trait]
pub trait Evaluator: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    fn examples(&self) -> &[ActionExample] {
        &[]
    }

    /// Bypassed when `always_run` is true.
    fn always_run(&self) -> bool {
        false
    }

    async fn validate(&self, runtime: &Runtime, message: &Message, state: Option<&State>) -> bool;

    async fn handler(
        &self,
        runtime: &Runtime,
        message: &Message,
        state: Option<&State>,
        responses: &[ActionResult],
    ) -> anyhow::Result<()>;
}

/// Runs every evaluator whose `validate` passes (or that has `always_run`
/// set), serially in registration order. A handler failure is logged and
/// never aborts the remaining evaluators or the message cycle.
pub async fn run_evaluators(
    runtime: &Runtime,
    evaluators: &[std::sync::Arc<dyn Evaluator>],
    message: &Message,
    state: Option<&State>,
    responses: &[ActionResult],
) -> usize {
    let mut ran = 0;
    for evaluator in evaluators {
        let should_run = evaluator.always_run() || evaluator.validate(runtime, message, state).await;
        if !should_run {
            continue;
        }
        if let Err(e) = evaluator.handler(runtime, message, state, responses).await {
            warn!(evaluator = evaluator.name(), error = %e, "evaluator failed, continuing");
        }
        ran += 1;
    }
    ran
}
