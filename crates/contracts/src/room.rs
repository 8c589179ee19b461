// Room and World - conversation channels and their containers

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoomType {
    #[serde(rename = "SELF")]
    SelfRoom,
    Dm,
    Group,
    VoiceDm,
    VoiceGroup,
    Feed,
    Thread,
    World,
    Forum,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Room {
    pub id: Uuid,
    /// Origin platform tag, e.g. "discord", "telegram".
    pub source: String,
    #[serde(rename = "type")]
    pub room_type: RoomType,
    #[serde(default)]
    pub world_id: Option<Uuid>,
    #[serde(default)]
    pub metadata: Option<Value>,
}

impl Room {
    pub fn new(source: impl Into<String>, room_type: RoomType) -> Self {
        Self {
            id: Uuid::now_v7(),
            source: source.into(),
            room_type,
            world_id: None,
            metadata: None,
        }
    }
}

/// A participant's role within a world.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorldRole {
    Owner,
    Admin,
    None,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct WorldMetadata {
    #[serde(default)]
    pub owner_entity_id: Option<Uuid>,
    #[serde(default)]
    pub roles: HashMap<Uuid, WorldRole>,
    #[serde(default, flatten)]
    pub extra: serde_json::Map<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct World {
    pub id: Uuid,
    pub agent_id: Uuid,
    pub server_id: String,
    #[serde(default)]
    pub metadata: WorldMetadata,
}

impl World {
    pub fn new(agent_id: Uuid, server_id: impl Into<String>) -> Self {
        Self {
            id: Uuid::now_v7(),
            agent_id,
            server_id: server_id.into(),
            metadata: WorldMetadata::default(),
        }
    }

    pub fn role_of(&self, entity_id: Uuid) -> WorldRole {
        self.metadata
            .roles
            .get(&entity_id)
            .copied()
            .unwrap_or(WorldRole::None)
    }
}

/// Participant following state within a room.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParticipantState {
    Followed,
    Muted,
}
