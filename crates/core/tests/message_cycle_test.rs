// End-to-end exercise of the compose-decide-act-evaluate cycle through a
// constructed `Runtime`: a character provider, a model handler, a single
// `REPLY` action, and an evaluator that counts its own invocations.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use runtime_contracts::{
    topics, ActionEffects, ActionExample, ActionPlan, ActionResult, Content, EventPayload,
    ExecutionModel, Memory, ModelType, PlanStep,
};
use runtime_core::action::Action;
use runtime_core::evaluator::Evaluator;
use runtime_core::model::ModelHandler;
use runtime_core::provider::Provider;
use runtime_core::runtime::{PlannerConfig, Runtime};
use runtime_core::settings::SettingsSource;
use runtime_core::state::{ProviderOutput, State};
use runtime_core::storage::InMemoryAdapter;
use runtime_planner::InMemoryTaskStore;
use serde_json::{Map, Value};
use uuid::Uuid;

struct CharacterProvider;

#[async_trait]
impl Provider for CharacterProvider {
    fn name(&self) -> &str {
        "CHAR"
    }

    async fn get(&self, _runtime: &Runtime, _message: &Memory, _state: &State) -> anyhow::Result<ProviderOutput> {
        Ok(ProviderOutput {
            values: Map::new(),
            data: Map::new(),
            text: "You are a helpful agent.".to_string(),
        })
    }
}

struct EchoModel;

#[async_trait]
impl ModelHandler for EchoModel {
    fn provider(&self) -> &str {
        "echo"
    }

    async fn handle(&self, _runtime: &Runtime, _params: Value) -> Result<Value, runtime_core::error::ModelError> {
        Ok(Value::String("hi!".to_string()))
    }
}

struct ReplyAction;

#[async_trait]
impl Action for ReplyAction {
    fn name(&self) -> &str {
        "REPLY"
    }

    fn description(&self) -> &str {
        "Replies to the user"
    }

    fn examples(&self) -> &[ActionExample] {
        &[]
    }

    fn effects(&self) -> ActionEffects {
        ActionEffects::default()
    }

    async fn validate(&self, _runtime: &Runtime, _message: &Memory, _state: Option<&State>) -> bool {
        true
    }

    async fn handler(
        &self,
        runtime: &Runtime,
        _message: &Memory,
        _state: Option<&State>,
        _params: &Map<String, Value>,
        _ctx: &runtime_planner::ActionContext,
    ) -> Result<ActionResult, runtime_core::error::RuntimeError> {
        let reply = runtime.use_model(ModelType::TextLarge, Value::Null).await?;
        let text = reply.as_str().unwrap_or_default().to_string();
        Ok(ActionResult::ok().with_text(text))
    }
}

struct CountingEvaluator {
    count: Arc<AtomicUsize>,
}

#[async_trait]
impl Evaluator for CountingEvaluator {
    fn name(&self) -> &str {
        "COUNTER"
    }

    fn description(&self) -> &str {
        "counts how many times it ran"
    }

    fn always_run(&self) -> bool {
        true
    }

    async fn validate(&self, _runtime: &Runtime, _message: &Memory, _state: Option<&State>) -> bool {
        true
    }

    async fn handler(
        &self,
        _runtime: &Runtime,
        _message: &Memory,
        _state: Option<&State>,
        _responses: &[ActionResult],
    ) -> anyhow::Result<()> {
        self.count.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

fn build_runtime() -> Arc<Runtime> {
    let runtime = Runtime::new(
        Uuid::new_v4(),
        Arc::new(InMemoryTaskStore::default()),
        SettingsSource::default(),
        PlannerConfig::default(),
    );

    runtime.registry().register_provider(Arc::new(CharacterProvider)).unwrap();
    runtime.registry().register_action(Arc::new(ReplyAction)).unwrap();
    runtime.registry().models.register(ModelType::TextLarge, Arc::new(EchoModel), 0);
    runtime.registry().set_adapter(Arc::new(InMemoryAdapter::new()), "in-memory").unwrap();

    runtime
}

#[tokio::test]
async fn single_action_reply_writes_a_memory_and_fires_message_sent() {
    let runtime = build_runtime();
    let sent_count = Arc::new(AtomicUsize::new(0));
    let sent_count_handler = Arc::clone(&sent_count);
    runtime.subscribe(
        topics::MESSAGE_SENT,
        Arc::new(move |_payload: EventPayload| {
            let sent_count_handler = Arc::clone(&sent_count_handler);
            Box::pin(async move {
                sent_count_handler.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
        }),
    );

    let agent_id = runtime.agent_id;
    let room_id = Uuid::new_v4();
    let entity_id = Uuid::new_v4();
    let incoming = Memory::new(entity_id, agent_id, room_id, Content::text("hello").with_action("REPLY"));

    let reply = runtime.handle_message(incoming, Content::text("hello").with_action("REPLY")).await.unwrap();

    assert_eq!(reply.content.text.as_deref(), Some("hi!"));
    assert_eq!(reply.room_id, room_id);
    assert_eq!(sent_count.load(Ordering::SeqCst), 1);

    let stored = runtime.get_memories(room_id, "messages", None, false).await.unwrap();
    assert_eq!(stored.len(), 2, "expected the incoming message and the reply both persisted");
    assert!(stored.iter().any(|m| m.content.text.as_deref() == Some("hi!")));
}

#[tokio::test]
async fn evaluators_run_after_the_reply_is_produced() {
    let runtime = build_runtime();
    let count = Arc::new(AtomicUsize::new(0));
    runtime.registry().register_evaluator(Arc::new(CountingEvaluator { count: Arc::clone(&count) })).unwrap();

    let agent_id = runtime.agent_id;
    let room_id = Uuid::new_v4();
    let entity_id = Uuid::new_v4();
    let incoming = Memory::new(entity_id, agent_id, room_id, Content::text("hello").with_action("REPLY"));

    runtime.handle_message(incoming, Content::text("hello").with_action("REPLY")).await.unwrap();

    assert_eq!(count.load(Ordering::SeqCst), 1);
}

/// Records the `ActionContext` it was actually invoked with, so the test
/// can confirm the planner hands a real, live context to production
/// actions rather than a discarded stand-in.
struct ContextRecordingAction;

#[async_trait]
impl Action for ContextRecordingAction {
    fn name(&self) -> &str {
        "RECORD_CTX"
    }

    fn description(&self) -> &str {
        "Writes its step id and a working-memory value, then reads it back"
    }

    fn examples(&self) -> &[ActionExample] {
        &[]
    }

    fn effects(&self) -> ActionEffects {
        ActionEffects::default()
    }

    async fn validate(&self, _runtime: &Runtime, _message: &Memory, _state: Option<&State>) -> bool {
        true
    }

    async fn handler(
        &self,
        _runtime: &Runtime,
        _message: &Memory,
        _state: Option<&State>,
        _params: &Map<String, Value>,
        ctx: &runtime_planner::ActionContext,
    ) -> Result<ActionResult, runtime_core::error::RuntimeError> {
        ctx.update_memory("seen_step", Value::String(ctx.step_id.clone()));
        assert!(!ctx.abort_signal.is_aborted());
        Ok(ActionResult::ok().with_text(ctx.step_id.clone()))
    }
}

#[tokio::test]
async fn planner_path_threads_a_real_action_context_into_the_handler() {
    let runtime = build_runtime();
    runtime.registry().register_action(Arc::new(ContextRecordingAction)).unwrap();

    let agent_id = runtime.agent_id;
    let room_id = Uuid::new_v4();
    let entity_id = Uuid::new_v4();
    let message = Memory::new(entity_id, agent_id, room_id, Content::text("go"));
    let state = runtime.compose_state(&message, &[], false, false).await;

    let plan = ActionPlan::new("record context", ExecutionModel::Sequential)
        .with_steps(vec![PlanStep::new("step-1", "RECORD_CTX")]);

    let result = runtime.execute_plan(plan, &message, &state).await;

    assert!(result.success);
    assert_eq!(result.completed_steps.len(), 1);
    assert!(result.completed_steps[0].success);
    assert_eq!(
        result.completed_steps[0].text.as_deref(),
        Some("step-1"),
        "the handler's own step_id from a real ActionContext must reach the outcome"
    );
}

#[tokio::test]
async fn provider_list_entirely_filtered_out_composes_empty_state() {
    let runtime = build_runtime();
    let agent_id = runtime.agent_id;
    let room_id = Uuid::new_v4();
    let entity_id = Uuid::new_v4();
    let message = Memory::new(entity_id, agent_id, room_id, Content::text("hi"));

    // "CHAR" isn't private/dynamic, so it always runs unless explicitly
    // excluded; simulate exclusion by requesting only a name nothing
    // provides.
    let state = runtime.compose_state(&message, &["NONEXISTENT".to_string()], true, false).await;

    assert!(state.values.is_empty());
    assert_eq!(state.text, "");
}
