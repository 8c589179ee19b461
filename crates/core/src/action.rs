//! The Action trait: a named capability the agent can invoke.

use async_trait::async_trait;
use runtime_contracts::{ActionEffects, ActionExample, ActionResult};
use serde_json::{Map, Value};

use runtime_planner::ActionContext;

use crate::runtime::Runtime;
use crate::state::State;
use crate::{Message, RuntimeError};

#[async_trait]
pub trait Action: Send + Sync {
    fn name(&self) -> &str;

    fn similes(&self) -> &[String] {
        &[]
    }

    fn description(&self) -> &str;

    fn examples(&self) -> &[ActionExample] {
        &[]
    }

    fn effects(&self) -> ActionEffects {
        ActionEffects::default()
    }

    /// Whether this action applies to the given message/state. Runs before
    /// `handler`; a `false` result excludes the action from this cycle's
    /// candidate set without counting as a failure.
    async fn validate(&self, runtime: &Runtime, message: &Message, state: Option<&State>) -> bool;

    /// Run the action. `params` carries the planner's step parameters when
    /// invoked under a plan, or is empty in single-action mode. `ctx` gives
    /// the handler its working memory, previous step results, abort
    /// signal, and the ability to request replanning; single-action mode
    /// builds a throwaway one-step context since there is no plan.
    async fn handler(
        &self,
        runtime: &Runtime,
        message: &Message,
        state: Option<&State>,
        params: &Map<String, Value>,
        ctx: &ActionContext,
    ) -> Result<ActionResult, RuntimeError>;
}
