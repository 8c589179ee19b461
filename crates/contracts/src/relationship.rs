// Relationship - a directed, agent-scoped edge between two entities

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Relationship {
    pub id: Uuid,
    pub agent_id: Uuid,
    pub source_entity_id: Uuid,
    pub target_entity_id: Uuid,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub metadata: RelationshipMetadata,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RelationshipMetadata {
    #[serde(default)]
    pub interaction_count: u64,
    #[serde(default)]
    pub trust: Option<f32>,
    #[serde(default)]
    pub last_interaction_at: Option<DateTime<Utc>>,
    #[serde(default, flatten)]
    pub extra: serde_json::Map<String, Value>,
}

impl Relationship {
    pub fn new(agent_id: Uuid, source_entity_id: Uuid, target_entity_id: Uuid) -> Self {
        Self {
            id: Uuid::now_v7(),
            agent_id,
            source_entity_id,
            target_entity_id,
            tags: Vec::new(),
            metadata: RelationshipMetadata::default(),
        }
    }
}
