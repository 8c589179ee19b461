//! Abstraction the planner uses to ask a model to draft a plan, without
//! depending on `runtime-core`'s model dispatcher directly.

use async_trait::async_trait;

#[async_trait]
pub trait PlanModelCaller: Send + Sync {
    /// Send the planning prompt to whichever text-large handler the caller
    /// has wired up and return the raw completion text. `Err` covers both
    /// "no handler registered" and the handler's own failure after its
    /// retries are exhausted - the generation module treats both the same
    /// way, by falling back to a single-step plan.
    async fn generate_plan_text(&self, prompt: &str) -> anyhow::Result<String>;
}
