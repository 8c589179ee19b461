//! Error taxonomy for the runtime: plugin loading, adapter access, model
//! dispatch, and configuration.

use runtime_planner::{PlanError, SchedulerError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PluginLoadError {
    #[error("plugin dependency cycle involving: {0:?}")]
    Cycle(Vec<String>),

    #[error("plugin {0} is registered more than once")]
    DuplicatePlugin(String),

    #[error("plugin {plugin} depends on unknown plugin {dependency}")]
    UnknownDependency { plugin: String, dependency: String },

    #[error("plugin {plugin} init failed: {source}")]
    InitFailed {
        plugin: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("more than one plugin registered a storage adapter (second: {0})")]
    DuplicateAdapter(String),

    #[error("duplicate {kind} registration: {name}")]
    DuplicateComponent { kind: &'static str, name: String },
}

#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("adapter not ready")]
    NotReady,

    #[error("transient adapter error: {0}")]
    Transient(String),

    #[error("conflicting write: {0}")]
    Conflict(String),

    #[error("not found: {0}")]
    NotFound(String),
}

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("no handler registered for model type {0}")]
    NoHandler(String),

    #[error("rate limited by provider {provider}")]
    RateLimited { provider: String },

    #[error("transient model error from {provider}: {message}")]
    Transient { provider: String, message: String },

    #[error("invalid response from {provider}: {message}")]
    InvalidResponse { provider: String, message: String },
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required setting: {0}")]
    MissingSetting(String),

    #[error("failed to decrypt setting {key}: {message}")]
    DecryptionFailed { key: String, message: String },
}

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error(transparent)]
    PluginLoad(#[from] PluginLoadError),

    #[error(transparent)]
    Adapter(#[from] AdapterError),

    #[error(transparent)]
    Model(#[from] ModelError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Plan(#[from] PlanError),

    #[error(transparent)]
    Scheduler(#[from] SchedulerError),

    #[error("adapter did not become ready within the startup budget")]
    AdapterNotReadyAtStartup,

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
