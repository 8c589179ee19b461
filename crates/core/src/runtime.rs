//! The `Runtime` façade: the single entry point every plugin, transport,
//! and action sees. Ties the registry, state composer, model dispatcher,
//! planner/executor, task scheduler, event bus, and settings resolver
//! into the public surface plugins are written against.

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use serde_json::{Map, Value};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use runtime_contracts::{
    topics, ActionDescriptor, ActionPlan, ActionResult, Component, ComponentScope, Content, Entity,
    EventPayload, Memory, MemoryKind, MemoryScope, ModelType, ParticipantState, PlanExecutionResult,
    Relationship, Room, Task, World,
};
use runtime_planner::{
    generate_plan as planner_generate_plan, ActionContext, ActionInvoker, PlanConstraints, PlanError,
    PlanExecutor, PlanModelCaller, TaskScheduler, TaskStore, TaskWorker,
};

use crate::action::Action;
use crate::adapter::StorageAdapter;
use crate::error::{AdapterError, ConfigError, ModelError as CoreModelError, RuntimeError};
use crate::evaluator::{run_evaluators, Evaluator};
use crate::event_bus::{EventBus, EventHandler};
use crate::plugin::{load_plugins, Plugin};
use crate::provider::StateComposer;
use crate::registry::Registry;
use crate::service::Service;
use crate::settings::{SettingsResolver, SettingsSource};
use crate::state::State;
use crate::Message;

/// Decides whether an incoming message's response should be executed as a
/// single action or handed to the planner, beyond the `names_multiple_actions`
/// check already implied by the response content.
#[async_trait]
pub trait IntentClassifier: Send + Sync {
    async fn recommends_planning(&self, message: &Message) -> bool;
}

/// Resolved open question: both the setting-enabled and intent-classified
/// triggers are implemented, explicitly and independently testable. The
/// default collapses to always-single-action.
#[derive(Default)]
pub struct PlannerConfig {
    pub enabled: bool,
    pub intent_classifier: Option<Arc<dyn IntentClassifier>>,
    pub max_steps: Option<usize>,
}

pub struct Runtime {
    pub agent_id: Uuid,
    registry: Arc<Registry>,
    composer: StateComposer,
    event_bus: EventBus,
    scheduler: Arc<TaskScheduler>,
    settings: SettingsResolver,
    planner_config: PlannerConfig,
    self_weak: Weak<Runtime>,
}

impl Runtime {
    pub fn new(
        agent_id: Uuid,
        task_store: Arc<dyn TaskStore>,
        settings_source: SettingsSource,
        planner_config: PlannerConfig,
    ) -> Arc<Self> {
        Arc::new_cyclic(|weak| Self {
            agent_id,
            registry: Arc::new(Registry::new()),
            composer: StateComposer::new(),
            event_bus: EventBus::new(),
            scheduler: Arc::new(TaskScheduler::new(task_store)),
            settings: SettingsResolver::new(settings_source),
            planner_config,
            self_weak: weak.clone(),
        })
    }

    /// A cloneable owning handle to this runtime, for callbacks that need
    /// `'static` ownership (service factories, event handlers).
    pub fn self_handle(&self) -> Arc<Runtime> {
        self.self_weak.upgrade().expect("runtime dropped while still in use")
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn event_bus(&self) -> &EventBus {
        &self.event_bus
    }

    pub fn scheduler(&self) -> &Arc<TaskScheduler> {
        &self.scheduler
    }

    // --- Plugin loading ---

    #[instrument(skip(self, plugins, configs))]
    pub async fn initialize(
        &self,
        plugins: Vec<Arc<dyn Plugin>>,
        configs: HashMap<String, Value>,
        adapter_ready_timeout_ms: u64,
    ) -> Result<(), RuntimeError> {
        load_plugins(plugins, &configs, self, &self.registry).await?;

        if let Some(adapter) = self.registry.adapter() {
            adapter
                .wait_for_ready(adapter_ready_timeout_ms)
                .await
                .map_err(|_| RuntimeError::AdapterNotReadyAtStartup)?;
        }

        info!(agent_id = %self.agent_id, "runtime initialized");
        Ok(())
    }

    pub fn register_plugin_contributions_adapter(&self) -> Option<Arc<dyn StorageAdapter>> {
        self.registry.adapter()
    }

    // --- Services ---

    pub fn get_service(&self, name: &str) -> Option<Arc<dyn Service>> {
        self.registry.get_service(name)
    }

    pub fn has_service(&self, name: &str) -> bool {
        self.registry.has_service(name)
    }

    // --- State composition ---

    pub async fn compose_state(
        &self,
        message: &Message,
        include_list: &[String],
        only_include: bool,
        skip_cache: bool,
    ) -> State {
        let providers = self.registry.providers();
        self.composer.compose(self, message, &providers, include_list, only_include, skip_cache).await
    }

    // --- Model dispatch ---

    pub async fn use_model(&self, model_type: ModelType, params: Value) -> Result<Value, CoreModelError> {
        self.registry.models.use_model(self, model_type, params).await
    }

    // --- Actions (single-action path) ---

    #[instrument(skip(self, message, state, content))]
    pub async fn process_actions(
        &self,
        message: &Message,
        content: &Content,
        state: Option<&State>,
    ) -> Vec<ActionResult> {
        let mut results = Vec::with_capacity(content.actions.len());
        for action_name in &content.actions {
            let Some(action) = self.registry.get_action(action_name) else {
                warn!(action = %action_name, "action named in response is not registered");
                results.push(ActionResult::failed(format!("unknown action {action_name}")));
                continue;
            };

            if !action.validate(self, message, state).await {
                continue;
            }

            self.event_bus
                .publish(
                    topics::ACTION_STARTED,
                    EventPayload::ActionStarted { action_name: action_name.clone(), step_id: None },
                )
                .await;

            let (_abort_handle, abort_signal) = runtime_planner::AbortHandle::new();
            let ctx = ActionContext::new(
                "single-action",
                action_name.clone(),
                Arc::new(runtime_planner::WorkingMemory::new()),
                Vec::new(),
                abort_signal,
            );

            let result = match action.handler(self, message, state, &Map::new(), &ctx).await {
                Ok(result) => result,
                Err(e) => {
                    warn!(action = %action_name, error = %e, "action handler failed");
                    ActionResult::failed(e.to_string())
                }
            };

            self.event_bus
                .publish(
                    topics::ACTION_COMPLETED,
                    EventPayload::ActionCompleted { action_name: action_name.clone(), success: result.success },
                )
                .await;

            results.push(result);
        }
        results
    }

    // --- Planning path ---

    /// Whether this response should be handed to the planner instead of
    /// run as a single action: the planner is enabled, and either the
    /// response names more than one action or the configured classifier
    /// recommends it.
    pub async fn should_plan(&self, message: &Message, content: &Content) -> bool {
        if !self.planner_config.enabled {
            return false;
        }
        if content.names_multiple_actions() {
            return true;
        }
        if let Some(classifier) = &self.planner_config.intent_classifier {
            return classifier.recommends_planning(message).await;
        }
        false
    }

    pub async fn generate_plan(
        &self,
        goal: &str,
        message: &Message,
        state: &State,
    ) -> Result<ActionPlan, PlanError> {
        let bridge = PlannerBridge::new(Arc::clone(&self.registry), self.self_weak.clone(), message.clone(), state.clone());
        let constraints = PlanConstraints {
            max_steps: self.planner_config.max_steps,
            ..Default::default()
        };
        planner_generate_plan(goal, &constraints, &bridge, &bridge).await
    }

    pub async fn execute_plan(
        &self,
        plan: ActionPlan,
        message: &Message,
        state: &State,
    ) -> PlanExecutionResult {
        let bridge = Arc::new(PlannerBridge::new(
            Arc::clone(&self.registry),
            self.self_weak.clone(),
            message.clone(),
            state.clone(),
        ));
        let executor = PlanExecutor::new(bridge.clone() as Arc<dyn ActionInvoker>, bridge as Arc<dyn PlanModelCaller>);
        let initial_memory: HashMap<String, Value> = state.values.clone().into_iter().collect();
        executor.execute(plan, initial_memory).await
    }

    // --- Evaluators ---

    pub async fn evaluate(&self, message: &Message, state: Option<&State>, responses: &[ActionResult]) -> usize {
        let evaluators = self.registry.evaluators();
        run_evaluators(self, &evaluators, message, state, responses).await
    }

    // --- Memory & embeddings ---

    fn adapter(&self) -> Result<Arc<dyn StorageAdapter>, RuntimeError> {
        self.registry.adapter().ok_or(RuntimeError::Adapter(AdapterError::NotReady))
    }

    #[instrument(skip(self, memory))]
    pub async fn create_memory(&self, mut memory: Memory, table_name: &str) -> Result<Uuid, RuntimeError> {
        if memory.embedding.is_none() && table_name == "messages" {
            if let Some(text) = memory.content.text.clone() {
                match self.use_model(ModelType::TextEmbedding, Value::String(text)).await {
                    Ok(Value::Array(items)) => {
                        let vector: Vec<f32> = items.iter().filter_map(|v| v.as_f64()).map(|v| v as f32).collect();
                        memory.embedding = Some(vector);
                    }
                    Ok(_) => warn!("embedding handler returned a non-array value, leaving memory unembedded"),
                    Err(e) => warn!(error = %e, "embedding computation failed, persisting without embedding"),
                }
            }
        }
        Ok(self.adapter()?.create_memory(memory, table_name).await?)
    }

    pub async fn get_memories(
        &self,
        room_id: Uuid,
        table_name: &str,
        count: Option<usize>,
        unique_only: bool,
    ) -> Result<Vec<Memory>, RuntimeError> {
        Ok(self.adapter()?.get_memories(room_id, table_name, count, unique_only).await?)
    }

    pub async fn search_memories(
        &self,
        embedding: &[f32],
        room_id: Option<Uuid>,
        table_name: &str,
        match_threshold: f32,
        count: usize,
    ) -> Result<Vec<Memory>, RuntimeError> {
        Ok(self.adapter()?.search_memories(embedding, room_id, table_name, match_threshold, count).await?)
    }

    pub async fn add_embedding_to_memory(&self, mut memory: Memory) -> Result<Memory, RuntimeError> {
        if let Some(text) = memory.content.text.clone() {
            let value = self.use_model(ModelType::TextEmbedding, Value::String(text)).await?;
            if let Value::Array(items) = value {
                memory.embedding = Some(items.iter().filter_map(|v| v.as_f64()).map(|v| v as f32).collect());
            }
        }
        Ok(memory)
    }

    // --- Entities ---

    pub async fn create_entity(&self, entity: Entity) -> Result<Uuid, RuntimeError> {
        Ok(self.adapter()?.create_entity(entity).await?)
    }

    pub async fn get_entity_by_id(&self, id: Uuid) -> Result<Option<Entity>, RuntimeError> {
        Ok(self.adapter()?.get_entity_by_id(id).await?)
    }

    pub async fn get_components(
        &self,
        entity_id: Uuid,
        component_type: &str,
        scope: ComponentScope,
    ) -> Result<Vec<Component>, RuntimeError> {
        Ok(self
            .adapter()?
            .get_components(entity_id, component_type, scope.world_id, scope.source_entity_id)
            .await?)
    }

    // --- Relationships ---

    pub async fn create_relationship(&self, relationship: Relationship) -> Result<Uuid, RuntimeError> {
        Ok(self.adapter()?.create_relationship(relationship).await?)
    }

    pub async fn get_relationships(&self, entity_id: Uuid, tags: &[String]) -> Result<Vec<Relationship>, RuntimeError> {
        Ok(self.adapter()?.get_relationships(entity_id, tags).await?)
    }

    // --- Rooms / worlds / participants ---

    pub async fn create_room(&self, room: Room) -> Result<Uuid, RuntimeError> {
        Ok(self.adapter()?.create_room(room).await?)
    }

    pub async fn get_room(&self, id: Uuid) -> Result<Option<Room>, RuntimeError> {
        Ok(self.adapter()?.get_room(id).await?)
    }

    pub async fn create_world(&self, world: World) -> Result<Uuid, RuntimeError> {
        Ok(self.adapter()?.create_world(world).await?)
    }

    pub async fn get_world(&self, id: Uuid) -> Result<Option<World>, RuntimeError> {
        Ok(self.adapter()?.get_world(id).await?)
    }

    pub async fn set_participant_state(
        &self,
        room_id: Uuid,
        entity_id: Uuid,
        state: Option<ParticipantState>,
    ) -> Result<(), RuntimeError> {
        Ok(self.adapter()?.set_participant_state(room_id, entity_id, state).await?)
    }

    pub async fn get_participant_state(&self, room_id: Uuid, entity_id: Uuid) -> Result<Option<ParticipantState>, RuntimeError> {
        Ok(self.adapter()?.get_participant_state(room_id, entity_id).await?)
    }

    // --- Tasks ---

    pub async fn register_task_worker(&self, name: impl Into<String>, worker: Arc<dyn TaskWorker>) {
        self.scheduler.register_task_worker(name, worker).await;
    }

    pub async fn get_task_worker(&self, name: &str) -> Option<Arc<dyn TaskWorker>> {
        self.scheduler.get_task_worker(name).await
    }

    pub async fn create_task(&self, task: Task) -> Uuid {
        self.scheduler.create_task(task).await
    }

    pub async fn get_tasks(&self) -> Vec<Task> {
        self.scheduler.get_tasks().await
    }

    pub async fn delete_task(&self, id: Uuid) -> Result<(), RuntimeError> {
        Ok(self.scheduler.delete_task(id).await?)
    }

    // --- Settings ---

    pub fn get_setting(&self, key: &str) -> Result<Option<String>, ConfigError> {
        self.settings.get(key)
    }

    // --- Events ---

    pub fn subscribe(&self, topic: impl Into<String>, handler: EventHandler) {
        self.event_bus.subscribe(topic, handler);
    }

    pub async fn emit(&self, topic: &str, payload: EventPayload) {
        self.event_bus.publish(topic, payload).await;
    }

    // --- The message cycle ---

    /// Drives one incoming message through compose-decide-act-evaluate:
    /// persist as memory, emit `MESSAGE_RECEIVED`, compose state, decide
    /// single-action vs. plan, run it, run evaluators, emit `MESSAGE_SENT`.
    #[instrument(skip(self, message, response_content), fields(room_id = %message.room_id))]
    pub async fn handle_message(
        &self,
        message: Memory,
        response_content: Content,
    ) -> Result<Memory, RuntimeError> {
        self.create_memory(message.clone(), "messages").await?;
        self.emit(topics::MESSAGE_RECEIVED, EventPayload::MessageReceived { memory: message.clone() }).await;

        let state = self.compose_state(&message, &response_content.providers, false, false).await;

        let responses = if self.should_plan(&message, &response_content).await {
            let goal = response_content.text.clone().unwrap_or_else(|| "respond to the user".to_string());
            match self.generate_plan(&goal, &message, &state).await {
                Ok(plan) => {
                    let result = self.execute_plan(plan, &message, &state).await;
                    result
                        .completed_steps
                        .into_iter()
                        .map(|outcome| ActionResult {
                            success: outcome.success,
                            values: outcome.values,
                            data: outcome.data,
                            text: outcome.text,
                            error: outcome.error,
                        })
                        .collect()
                }
                Err(e) => {
                    warn!(error = %e, "plan generation failed, falling back to single action mode");
                    self.process_actions(&message, &response_content, Some(&state)).await
                }
            }
        } else {
            self.process_actions(&message, &response_content, Some(&state)).await
        };

        let reply_text = responses
            .iter()
            .filter_map(|r| r.text.clone())
            .find(|t| !t.is_empty())
            .or_else(|| response_content.text.clone())
            .unwrap_or_default();

        let reply = Memory::new(message.agent_id, message.agent_id, message.room_id, Content::text(reply_text))
            .with_metadata(MemoryKind::Message, MemoryScope::Room);
        self.create_memory(reply.clone(), "messages").await?;
        self.emit(topics::MESSAGE_SENT, EventPayload::MessageSent { memory: reply.clone() }).await;

        self.evaluate(&message, Some(&state), &responses).await;

        Ok(reply)
    }
}

/// Bridges the planner's `ActionInvoker`/`PlanModelCaller` traits to a
/// specific message-handling cycle's registry, message, and composed
/// state, without giving the planner crate visibility into either.
struct PlannerBridge {
    registry: Arc<Registry>,
    runtime: Weak<Runtime>,
    message: Message,
    state: State,
}

impl PlannerBridge {
    fn new(registry: Arc<Registry>, runtime: Weak<Runtime>, message: Message, state: State) -> Self {
        Self { registry, runtime, message, state }
    }

    fn runtime(&self) -> Arc<Runtime> {
        self.runtime.upgrade().expect("runtime dropped mid-plan")
    }
}

#[async_trait]
impl ActionInvoker for PlannerBridge {
    fn available_actions(&self) -> Vec<ActionDescriptor> {
        self.registry.action_descriptors()
    }

    fn has_action(&self, name: &str) -> bool {
        self.registry.has_action(name)
    }

    async fn invoke(
        &self,
        action_name: &str,
        params: &Map<String, Value>,
        ctx: &ActionContext,
    ) -> anyhow::Result<ActionResult> {
        let action = self
            .registry
            .get_action(action_name)
            .ok_or_else(|| anyhow::anyhow!("unknown action {action_name}"))?;
        let runtime = self.runtime();

        if !action.validate(&runtime, &self.message, Some(&self.state)).await {
            return Ok(ActionResult::failed(format!("{action_name} validation rejected this step")));
        }

        action
            .handler(&runtime, &self.message, Some(&self.state), params, ctx)
            .await
            .map_err(anyhow::Error::from)
    }
}

#[async_trait]
impl PlanModelCaller for PlannerBridge {
    async fn generate_plan_text(&self, prompt: &str) -> anyhow::Result<String> {
        let runtime = self.runtime();
        let mut result = runtime.use_model(ModelType::TextReasoningLarge, Value::String(prompt.to_string())).await;
        if matches!(result, Err(CoreModelError::NoHandler(_))) {
            result = runtime.use_model(ModelType::TextLarge, Value::String(prompt.to_string())).await;
        }
        let value = result?;
        match value {
            Value::String(text) => Ok(text),
            other => Ok(other.to_string()),
        }
    }
}
