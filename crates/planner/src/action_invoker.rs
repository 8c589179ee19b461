//! Abstraction the planner uses to actually run an action, without
//! depending on the registry/runtime crate that owns action handlers.
//!
//! `runtime-core` implements this trait once, over its own registry, and
//! hands the planner a `Arc<dyn ActionInvoker>`. Keeps the dependency
//! edge pointing one way: core depends on planner, never the reverse.

use async_trait::async_trait;
use runtime_contracts::{ActionDescriptor, ActionResult};
use serde_json::{Map, Value};

use crate::context::ActionContext;

#[async_trait]
pub trait ActionInvoker: Send + Sync {
    /// List the actions currently registered, for prompt construction and
    /// for validating a generated plan's step references.
    fn available_actions(&self) -> Vec<ActionDescriptor>;

    fn has_action(&self, name: &str) -> bool;

    /// Run the named action's validate+handler pair under the given step
    /// context. Returns `Err` only for infrastructure failures (action not
    /// found); a handler's own failure is reported via `ActionResult.success`.
    async fn invoke(
        &self,
        action_name: &str,
        params: &Map<String, Value>,
        ctx: &ActionContext,
    ) -> anyhow::Result<ActionResult>;
}
