// Event bus topics and payloads

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::memory::Memory;

/// Well-known topics. Plugins may publish/subscribe to additional
/// plugin-defined topics by name; the bus itself is topic-agnostic.
pub mod topics {
    pub const MESSAGE_RECEIVED: &str = "MESSAGE_RECEIVED";
    pub const MESSAGE_SENT: &str = "MESSAGE_SENT";
    pub const WORLD_JOINED: &str = "WORLD_JOINED";
    pub const ENTITY_JOINED: &str = "ENTITY_JOINED";
    pub const ACTION_STARTED: &str = "ACTION_STARTED";
    pub const ACTION_COMPLETED: &str = "ACTION_COMPLETED";
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum EventPayload {
    MessageReceived { memory: Memory },
    MessageSent { memory: Memory },
    WorldJoined { world_id: Uuid, entity_id: Uuid },
    EntityJoined { entity_id: Uuid, room_id: Uuid },
    ActionStarted { action_name: String, step_id: Option<String> },
    ActionCompleted { action_name: String, success: bool },
    /// Plugin-defined payload for a plugin-defined topic.
    Custom(Value),
}
