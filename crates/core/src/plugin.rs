//! Plugin manifests and the loader: dependency-DAG expansion, cycle
//! detection, topological sort with priority as tiebreak, `init`
//! invocation, then installation of contributed components into the
//! registry.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{info, instrument};

use crate::action::Action;
use crate::adapter::StorageAdapter;
use crate::error::PluginLoadError;
use crate::evaluator::Evaluator;
use crate::event_bus::EventHandler;
use crate::model::ModelHandler;
use crate::provider::Provider;
use crate::registry::{Registry, RouteDescriptor};
use crate::runtime::Runtime;
use crate::service::ServiceFactory;
use runtime_contracts::ModelType;
use runtime_planner::TaskWorker;

/// Everything a plugin may contribute, installed into the registry after
/// a successful `init`.
#[derive(Default)]
pub struct PluginContributions {
    pub services: Vec<ServiceFactory>,
    pub actions: Vec<Arc<dyn Action>>,
    pub providers: Vec<Arc<dyn Provider>>,
    pub evaluators: Vec<Arc<dyn Evaluator>>,
    pub models: Vec<(ModelType, Arc<dyn ModelHandler>)>,
    pub events: Vec<(String, EventHandler)>,
    pub routes: Vec<RouteDescriptor>,
    pub adapter: Option<Arc<dyn StorageAdapter>>,
    pub task_workers: Vec<(String, Arc<dyn TaskWorker>)>,
}

#[async_trait]
pub trait Plugin: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str {
        ""
    }

    /// Names of other plugins this one requires to have already loaded.
    fn dependencies(&self) -> &[String] {
        &[]
    }

    /// Higher runs first among nodes with no remaining incoming edges.
    fn priority(&self) -> i32 {
        0
    }

    /// Called once, in load order, with the partially-assembled runtime.
    /// A plugin that needs another plugin's registrations (actions,
    /// services) can read them here since loading happens in dependency
    /// order.
    async fn init(&self, config: &Value, runtime: &Runtime) -> anyhow::Result<PluginContributions>;
}

struct LoadNode {
    plugin: Arc<dyn Plugin>,
    index: usize,
}

/// Expands the dependency graph, detects cycles, and returns plugins in
/// an order where every plugin appears after all its dependencies,
/// breaking ties by descending priority then by original registration
/// order.
pub fn resolve_load_order(plugins: Vec<Arc<dyn Plugin>>) -> Result<Vec<Arc<dyn Plugin>>, PluginLoadError> {
    let mut by_name: HashMap<String, LoadNode> = HashMap::new();
    for (index, plugin) in plugins.into_iter().enumerate() {
        let name = plugin.name().to_string();
        if by_name.contains_key(&name) {
            return Err(PluginLoadError::DuplicatePlugin(name));
        }
        by_name.insert(name, LoadNode { plugin, index });
    }

    for node in by_name.values() {
        for dep in node.plugin.dependencies() {
            if !by_name.contains_key(dep) {
                return Err(PluginLoadError::UnknownDependency {
                    plugin: node.plugin.name().to_string(),
                    dependency: dep.clone(),
                });
            }
        }
    }

    let mut in_degree: HashMap<String, usize> =
        by_name.iter().map(|(name, node)| (name.clone(), node.plugin.dependencies().len())).collect();
    let mut dependents: HashMap<String, Vec<String>> = HashMap::new();
    for node in by_name.values() {
        for dep in node.plugin.dependencies() {
            dependents.entry(dep.clone()).or_default().push(node.plugin.name().to_string());
        }
    }

    let mut order: Vec<Arc<dyn Plugin>> = Vec::with_capacity(by_name.len());
    let mut frontier: Vec<String> = in_degree.iter().filter(|(_, &d)| d == 0).map(|(n, _)| n.clone()).collect();

    while !frontier.is_empty() {
        frontier.sort_by(|a, b| {
            let node_a = &by_name[a];
            let node_b = &by_name[b];
            node_b
                .plugin
                .priority()
                .cmp(&node_a.plugin.priority())
                .then(node_a.index.cmp(&node_b.index))
        });
        let name = frontier.remove(0);
        let node = &by_name[&name];
        order.push(Arc::clone(&node.plugin));

        if let Some(deps) = dependents.get(&name) {
            for dependent in deps.clone() {
                let deg = in_degree.get_mut(&dependent).expect("dependent tracked in in_degree");
                *deg -= 1;
                if *deg == 0 {
                    frontier.push(dependent);
                }
            }
        }
    }

    if order.len() < by_name.len() {
        let mut cyclic: Vec<String> = by_name
            .keys()
            .filter(|name| !order.iter().any(|p| p.name() == name.as_str()))
            .cloned()
            .collect();
        cyclic.sort();
        return Err(PluginLoadError::Cycle(cyclic));
    }

    Ok(order)
}

/// Runs `init` on each plugin in load order and installs its
/// contributions into `registry`. Stops at the first failure; plugins
/// already installed remain registered.
#[instrument(skip(plugins, configs, runtime, registry))]
pub async fn load_plugins(
    plugins: Vec<Arc<dyn Plugin>>,
    configs: &HashMap<String, Value>,
    runtime: &Runtime,
    registry: &Registry,
) -> Result<(), PluginLoadError> {
    let order = resolve_load_order(plugins)?;
    let mut seen: HashSet<String> = HashSet::new();

    for plugin in order {
        let name = plugin.name().to_string();
        if !seen.insert(name.clone()) {
            continue;
        }

        let config = configs.get(&name).cloned().unwrap_or(Value::Null);
        let contributions = plugin.init(&config, runtime).await.map_err(|source| PluginLoadError::InitFailed {
            plugin: name.clone(),
            source,
        })?;

        install(&name, plugin.priority(), contributions, runtime, registry).await?;
        info!(plugin = %name, "plugin loaded");
    }

    Ok(())
}

async fn install(
    plugin_name: &str,
    plugin_priority: i32,
    contributions: PluginContributions,
    runtime: &Runtime,
    registry: &Registry,
) -> Result<(), PluginLoadError> {
    for action in contributions.actions {
        registry.register_action(action)?;
    }
    for provider in contributions.providers {
        registry.register_provider(provider)?;
    }
    for evaluator in contributions.evaluators {
        registry.register_evaluator(evaluator)?;
    }
    for (model_type, handler) in contributions.models {
        registry.models.register(model_type, handler, plugin_priority);
    }
    for route in contributions.routes {
        registry.register_route(route);
    }
    if let Some(adapter) = contributions.adapter {
        registry.set_adapter(adapter, plugin_name)?;
    }

    let runtime_handle = runtime.self_handle();
    for factory in contributions.services {
        let service = factory(Arc::clone(&runtime_handle))
            .await
            .map_err(|source| PluginLoadError::InitFailed { plugin: plugin_name.to_string(), source })?;
        registry.register_service(service)?;
    }

    for (topic, handler) in contributions.events {
        runtime.event_bus().subscribe(topic, handler);
    }
    for (name, worker) in contributions.task_workers {
        runtime.scheduler().register_task_worker(name, worker).await;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Stub {
        name: &'static str,
        deps: Vec<String>,
        priority: i32,
    }

    #[async_trait]
    impl Plugin for Stub {
        fn name(&self) -> &str {
            self.name
        }
        fn dependencies(&self) -> &[String] {
            &self.deps
        }
        fn priority(&self) -> i32 {
            self.priority
        }
        async fn init(&self, _config: &Value, _runtime: &Runtime) -> anyhow::Result<PluginContributions> {
            Ok(PluginContributions::default())
        }
    }

    fn stub(name: &'static str, deps: &[&str], priority: i32) -> Arc<dyn Plugin> {
        Arc::new(Stub {
            name,
            deps: deps.iter().map(|s| s.to_string()).collect(),
            priority,
        })
    }

    #[test]
    fn dependencies_load_before_dependents() {
        let plugins = vec![stub("b", &["a"], 0), stub("a", &[], 0)];
        let order = resolve_load_order(plugins).unwrap();
        let names: Vec<&str> = order.iter().map(|p| p.name()).collect();
        assert_eq!(names, vec!["a", "b"]);
    }

    #[test]
    fn priority_breaks_ties_among_available_nodes_only() {
        let plugins = vec![stub("low", &[], 1), stub("high", &[], 10), stub("dependent", &["low"], 100)];
        let order = resolve_load_order(plugins).unwrap();
        let names: Vec<&str> = order.iter().map(|p| p.name()).collect();
        // "dependent" has the highest priority but must still load after "low".
        assert_eq!(names, vec!["high", "low", "dependent"]);
    }

    #[test]
    fn cycle_is_reported_with_every_member() {
        let plugins = vec![stub("a", &["b"], 0), stub("b", &["a"], 0)];
        let err = resolve_load_order(plugins).unwrap_err();
        match err {
            PluginLoadError::Cycle(mut members) => {
                members.sort();
                assert_eq!(members, vec!["a".to_string(), "b".to_string()]);
            }
            other => panic!("expected Cycle, got {other:?}"),
        }
    }

    #[test]
    fn unknown_dependency_is_rejected() {
        let plugins = vec![stub("a", &["ghost"], 0)];
        let err = resolve_load_order(plugins).unwrap_err();
        assert!(matches!(err, PluginLoadError::UnknownDependency { .. }));
    }

    #[test]
    fn duplicate_plugin_name_is_rejected() {
        let plugins = vec![stub("a", &[], 0), stub("a", &[], 0)];
        let err = resolve_load_order(plugins).unwrap_err();
        assert!(matches!(err, PluginLoadError::DuplicatePlugin(_)));
    }
}
