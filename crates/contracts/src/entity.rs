// Entity and Component - the bag-of-components participant model

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Entity {
    pub id: Uuid,
    pub agent_id: Uuid,
    /// Ordered aliases; the first is canonical.
    pub names: Vec<String>,
    #[serde(default)]
    pub metadata: Option<Value>,
    #[serde(default)]
    pub components: Vec<Component>,
}

impl Entity {
    pub fn new(id: Uuid, agent_id: Uuid, canonical_name: impl Into<String>) -> Self {
        Self {
            id,
            agent_id,
            names: vec![canonical_name.into()],
            metadata: None,
            components: Vec::new(),
        }
    }

    pub fn canonical_name(&self) -> Option<&str> {
        self.names.first().map(String::as_str)
    }
}

/// A typed data blob attached to an entity, scoped by the full 6-tuple.
/// New data shapes can be introduced without a schema migration - the
/// `data` payload is whatever the contributing plugin chooses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Component {
    pub id: Uuid,
    pub entity_id: Uuid,
    pub agent_id: Uuid,
    #[serde(default)]
    pub world_id: Option<Uuid>,
    #[serde(default)]
    pub room_id: Option<Uuid>,
    #[serde(default)]
    pub source_entity_id: Option<Uuid>,
    #[serde(rename = "type")]
    pub component_type: String,
    pub data: Value,
}

/// Filter used when fetching a component by entity + type.
#[derive(Debug, Clone, Default)]
pub struct ComponentScope {
    pub world_id: Option<Uuid>,
    pub room_id: Option<Uuid>,
    pub source_entity_id: Option<Uuid>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_name_is_first_alias() {
        let mut e = Entity::new(Uuid::new_v4(), Uuid::new_v4(), "Alice");
        e.names.push("aka-bob".into());
        assert_eq!(e.canonical_name(), Some("Alice"));
    }
}
