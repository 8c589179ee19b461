//! Typed tables of actions, providers, evaluators, services, model
//! handlers, event subscribers, task workers, and routes, populated by
//! plugin registration. Append-only after plugin load: readers never take
//! a lock once `initialize()` has returned.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use runtime_contracts::ActionDescriptor;

use crate::action::Action;
use crate::adapter::StorageAdapter;
use crate::error::PluginLoadError;
use crate::evaluator::Evaluator;
use crate::model::ModelDispatcher;
use crate::provider::Provider;
use crate::service::Service;

/// A registered HTTP/WS route contributed by a plugin. The transport that
/// actually serves these is out of scope; the registry only tracks them
/// so a transport adapter can enumerate what plugins want exposed.
#[derive(Debug, Clone)]
pub struct RouteDescriptor {
    pub method: String,
    pub path: String,
    pub plugin: String,
}

#[derive(Default)]
pub struct Registry {
    actions: RwLock<HashMap<String, Arc<dyn Action>>>,
    providers: RwLock<Vec<Arc<dyn Provider>>>,
    evaluators: RwLock<Vec<Arc<dyn Evaluator>>>,
    services: RwLock<HashMap<String, Arc<dyn Service>>>,
    routes: RwLock<Vec<RouteDescriptor>>,
    adapter: RwLock<Option<Arc<dyn StorageAdapter>>>,
    pub models: ModelDispatcher,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_action(&self, action: Arc<dyn Action>) -> Result<(), PluginLoadError> {
        let name = action.name().to_string();
        let mut actions = self.actions.write().expect("action registry lock poisoned");
        if actions.contains_key(&name) {
            return Err(PluginLoadError::DuplicateComponent { kind: "action", name });
        }
        actions.insert(name, action);
        Ok(())
    }

    pub fn get_action(&self, name: &str) -> Option<Arc<dyn Action>> {
        self.actions.read().expect("action registry lock poisoned").get(name).cloned()
    }

    pub fn has_action(&self, name: &str) -> bool {
        self.actions.read().expect("action registry lock poisoned").contains_key(name)
    }

    pub fn action_descriptors(&self) -> Vec<ActionDescriptor> {
        self.actions
            .read()
            .expect("action registry lock poisoned")
            .values()
            .map(|a| ActionDescriptor {
                name: a.name().to_string(),
                similes: a.similes().to_vec(),
                description: a.description().to_string(),
                effects: a.effects(),
            })
            .collect()
    }

    pub fn register_provider(&self, provider: Arc<dyn Provider>) -> Result<(), PluginLoadError> {
        let name = provider.name().to_string();
        let mut providers = self.providers.write().expect("provider registry lock poisoned");
        if providers.iter().any(|p| p.name() == name) {
            return Err(PluginLoadError::DuplicateComponent { kind: "provider", name });
        }
        providers.push(provider);
        Ok(())
    }

    pub fn providers(&self) -> Vec<Arc<dyn Provider>> {
        self.providers.read().expect("provider registry lock poisoned").clone()
    }

    pub fn register_evaluator(&self, evaluator: Arc<dyn Evaluator>) -> Result<(), PluginLoadError> {
        let name = evaluator.name().to_string();
        let mut evaluators = self.evaluators.write().expect("evaluator registry lock poisoned");
        if evaluators.iter().any(|e| e.name() == name) {
            return Err(PluginLoadError::DuplicateComponent { kind: "evaluator", name });
        }
        evaluators.push(evaluator);
        Ok(())
    }

    pub fn evaluators(&self) -> Vec<Arc<dyn Evaluator>> {
        self.evaluators.read().expect("evaluator registry lock poisoned").clone()
    }

    pub fn register_service(&self, service: Arc<dyn Service>) -> Result<(), PluginLoadError> {
        let name = service.service_name().to_string();
        let mut services = self.services.write().expect("service registry lock poisoned");
        if services.contains_key(&name) {
            return Err(PluginLoadError::DuplicateComponent { kind: "service", name });
        }
        services.insert(name, service);
        Ok(())
    }

    pub fn get_service(&self, name: &str) -> Option<Arc<dyn Service>> {
        self.services.read().expect("service registry lock poisoned").get(name).cloned()
    }

    pub fn has_service(&self, name: &str) -> bool {
        self.services.read().expect("service registry lock poisoned").contains_key(name)
    }

    pub async fn stop_all_services(&self) {
        let services: Vec<Arc<dyn Service>> = self.services.read().expect("service registry lock poisoned").values().cloned().collect();
        for service in services {
            if let Err(e) = service.stop().await {
                tracing::warn!(service = service.service_name(), error = %e, "service stop failed");
            }
        }
    }

    pub fn register_route(&self, route: RouteDescriptor) {
        self.routes.write().expect("route registry lock poisoned").push(route);
    }

    pub fn routes(&self) -> Vec<RouteDescriptor> {
        self.routes.read().expect("route registry lock poisoned").clone()
    }

    /// At most one plugin may contribute a storage adapter; the second
    /// attempt is rejected rather than silently overwriting the first.
    pub fn set_adapter(&self, adapter: Arc<dyn StorageAdapter>, plugin_name: &str) -> Result<(), PluginLoadError> {
        let mut slot = self.adapter.write().expect("adapter slot lock poisoned");
        if slot.is_some() {
            return Err(PluginLoadError::DuplicateAdapter(plugin_name.to_string()));
        }
        *slot = Some(adapter);
        Ok(())
    }

    pub fn adapter(&self) -> Option<Arc<dyn StorageAdapter>> {
        self.adapter.read().expect("adapter slot lock poisoned").clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::Runtime;
    use crate::state::State;
    use crate::Message;
    use async_trait::async_trait;
    use runtime_contracts::{ActionEffects, ActionExample, ActionResult};
    use serde_json::{Map, Value};

    struct StubAction(&'static str);

    #[async_trait]
    impl Action for StubAction {
        fn name(&self) -> &str {
            self.0
        }
        fn description(&self) -> &str {
            "stub"
        }
        fn examples(&self) -> &[ActionExample] {
            &[]
        }
        fn effects(&self) -> ActionEffects {
            ActionEffects::default()
        }
        async fn validate(&self, _r: &Runtime, _m: &Message, _s: Option<&State>) -> bool {
            true
        }
        async fn handler(
            &self,
            _r: &Runtime,
            _m: &Message,
            _s: Option<&State>,
            _p: &Map<String, Value>,
            _ctx: &runtime_planner::ActionContext,
        ) -> Result<ActionResult, crate::RuntimeError> {
            Ok(ActionResult::ok())
        }
    }

    #[test]
    fn duplicate_action_registration_is_rejected() {
        let registry = Registry::new();
        registry.register_action(Arc::new(StubAction("REPLY"))).unwrap();
        let err = registry.register_action(Arc::new(StubAction("REPLY"))).unwrap_err();
        assert!(matches!(err, PluginLoadError::DuplicateComponent { .. }));
    }

    #[test]
    fn second_adapter_registration_is_rejected() {
        let registry = Registry::new();
        assert!(registry.adapter().is_none());
        registry.set_adapter(Arc::new(crate::storage::InMemoryAdapter::new()), "sql").unwrap();
        assert!(registry.adapter().is_some());

        let err = registry.set_adapter(Arc::new(crate::storage::InMemoryAdapter::new()), "sqlite").unwrap_err();
        match err {
            PluginLoadError::DuplicateAdapter(plugin) => assert_eq!(plugin, "sqlite"),
            other => panic!("expected DuplicateAdapter, got {other:?}"),
        }
    }

    #[test]
    fn action_lookups_round_trip() {
        let registry = Registry::new();
        assert!(!registry.has_action("REPLY"));
        registry.register_action(Arc::new(StubAction("REPLY"))).unwrap();
        assert!(registry.has_action("REPLY"));
    }
}
