//! Model dispatch: routes `use_model` calls to the highest-priority
//! registered handler for a model type, with fallback on retryable errors.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Instant;

use async_trait::async_trait;
use chrono::Utc;
use runtime_contracts::{ModelInvocationLog, ModelType};
use serde_json::Value;
use tracing::{info, warn};

use crate::error::ModelError;
use crate::runtime::Runtime;

#[async_trait]
pub trait ModelHandler: Send + Sync {
    /// The plugin that contributed this handler, for observability and for
    /// picking a fallback candidate that isn't the one that just failed.
    fn provider(&self) -> &str;

    async fn handle(&self, runtime: &Runtime, params: Value) -> Result<Value, ModelError>;
}

struct RegisteredHandler {
    handler: Arc<dyn ModelHandler>,
    priority: i32,
    registration_order: u64,
}

/// Classifies an error as worth falling back on or not. Kept as a
/// standalone policy object per the design note: the dispatcher itself
/// stays mechanical.
pub fn is_retryable(error: &ModelError) -> bool {
    matches!(error, ModelError::RateLimited { .. } | ModelError::Transient { .. })
}

#[derive(Default)]
pub struct ModelDispatcher {
    handlers: RwLock<HashMap<ModelType, Vec<RegisteredHandler>>>,
    next_order: AtomicU64,
    log: RwLock<Vec<ModelInvocationLog>>,
}

impl ModelDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, model_type: ModelType, handler: Arc<dyn ModelHandler>, priority: i32) {
        let order = self.next_order.fetch_add(1, Ordering::SeqCst);
        self.handlers
            .write()
            .expect("model handler registry lock poisoned")
            .entry(model_type)
            .or_default()
            .push(RegisteredHandler {
                handler,
                priority,
                registration_order: order,
            });
    }

    fn candidates(&self, model_type: &ModelType) -> Vec<Arc<dyn ModelHandler>> {
        let guard = self.handlers.read().expect("model handler registry lock poisoned");
        let mut entries: Vec<&RegisteredHandler> = guard.get(model_type).map(|v| v.iter().collect()).unwrap_or_default();
        entries.sort_by(|a, b| b.priority.cmp(&a.priority).then(a.registration_order.cmp(&b.registration_order)));
        entries.into_iter().map(|e| Arc::clone(&e.handler)).collect()
    }

    pub async fn use_model(&self, runtime: &Runtime, model_type: ModelType, params: Value) -> Result<Value, ModelError> {
        let candidates = self.candidates(&model_type);
        if candidates.is_empty() {
            return Err(ModelError::NoHandler(model_type.to_string()));
        }

        let mut last_err = None;
        for (attempt, handler) in candidates.iter().enumerate() {
            let started = Instant::now();
            let result = handler.handle(runtime, params.clone()).await;
            let duration_ms = started.elapsed().as_millis() as u64;

            match result {
                Ok(output) => {
                    self.record(ModelInvocationLog {
                        model_type: model_type.to_string(),
                        provider: handler.provider().to_string(),
                        duration_ms,
                        input_shape: shape_of(&params),
                        output_shape: shape_of(&output),
                        fallback_used: attempt > 0,
                        at: Utc::now(),
                        error: None,
                    });
                    info!(model_type = %model_type, provider = handler.provider(), duration_ms, "model call completed");
                    return Ok(output);
                }
                Err(e) => {
                    self.record(ModelInvocationLog {
                        model_type: model_type.to_string(),
                        provider: handler.provider().to_string(),
                        duration_ms,
                        input_shape: shape_of(&params),
                        output_shape: "none".to_string(),
                        fallback_used: attempt > 0,
                        at: Utc::now(),
                        error: Some(e.to_string()),
                    });
                    if is_retryable(&e) && attempt + 1 < candidates.len() {
                        warn!(provider = handler.provider(), error = %e, "model handler failed, falling back");
                        last_err = Some(e);
                        continue;
                    }
                    return Err(e);
                }
            }
        }

        Err(last_err.unwrap_or_else(|| ModelError::NoHandler(model_type.to_string())))
    }

    fn record(&self, entry: ModelInvocationLog) {
        self.log.write().expect("model invocation log lock poisoned").push(entry);
    }

    pub fn invocation_log(&self) -> Vec<ModelInvocationLog> {
        self.log.read().expect("model invocation log lock poisoned").clone()
    }
}

/// A coarse type-shape description for observability, not a schema.
fn shape_of(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Bool(_) => "bool".to_string(),
        Value::Number(_) => "number".to_string(),
        Value::String(_) => "string".to_string(),
        Value::Array(items) => format!("array[{}]", items.len()),
        Value::Object(map) => format!("object{{{}}}", map.keys().cloned().collect::<Vec<_>>().join(",")),
    }
}
