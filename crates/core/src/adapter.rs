//! The storage adapter contract: every persistence operation the core
//! consumes. A concrete adapter (SQL, PGLite, or an in-memory stand-in)
//! implements this trait; the core never assumes a particular table shape.

use async_trait::async_trait;
use runtime_contracts::{Component, Entity, Memory, ParticipantState, Relationship, Room, Task, World};
use serde_json::Value;
use uuid::Uuid;

use crate::error::AdapterError;

pub type AdapterResult<T> = Result<T, AdapterError>;

#[async_trait]
pub trait StorageAdapter: Send + Sync {
    async fn is_ready(&self) -> bool;

    /// Polls `is_ready` until it returns `true` or `timeout_ms` elapses.
    async fn wait_for_ready(&self, timeout_ms: u64) -> AdapterResult<()> {
        let deadline = tokio::time::Instant::now() + std::time::Duration::from_millis(timeout_ms);
        loop {
            if self.is_ready().await {
                return Ok(());
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(AdapterError::NotReady);
            }
            tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        }
    }

    // --- Entities ---
    async fn create_entity(&self, entity: Entity) -> AdapterResult<Uuid>;
    async fn get_entity_by_id(&self, id: Uuid) -> AdapterResult<Option<Entity>>;
    async fn get_entities_by_ids(&self, ids: &[Uuid]) -> AdapterResult<Vec<Entity>>;
    async fn update_entity(&self, entity: Entity) -> AdapterResult<()>;
    async fn get_entities_for_room(&self, room_id: Uuid) -> AdapterResult<Vec<Entity>>;

    // --- Components ---
    async fn create_component(&self, component: Component) -> AdapterResult<Uuid>;
    async fn get_components(
        &self,
        entity_id: Uuid,
        component_type: &str,
        world_id: Option<Uuid>,
        source_entity_id: Option<Uuid>,
    ) -> AdapterResult<Vec<Component>>;
    async fn update_component(&self, component: Component) -> AdapterResult<()>;
    async fn delete_component(&self, id: Uuid) -> AdapterResult<()>;

    // --- Rooms / Worlds ---
    async fn create_room(&self, room: Room) -> AdapterResult<Uuid>;
    async fn get_room(&self, id: Uuid) -> AdapterResult<Option<Room>>;
    async fn get_rooms(&self, world_id: Uuid) -> AdapterResult<Vec<Room>>;
    async fn update_room(&self, room: Room) -> AdapterResult<()>;
    async fn delete_room(&self, id: Uuid) -> AdapterResult<()>;

    async fn create_world(&self, world: World) -> AdapterResult<Uuid>;
    async fn get_world(&self, id: Uuid) -> AdapterResult<Option<World>>;
    async fn get_all_worlds(&self) -> AdapterResult<Vec<World>>;
    async fn update_world(&self, world: World) -> AdapterResult<()>;
    async fn delete_world(&self, id: Uuid) -> AdapterResult<()>;

    // --- Participants ---
    async fn add_participant(&self, room_id: Uuid, entity_id: Uuid) -> AdapterResult<()>;
    async fn remove_participant(&self, room_id: Uuid, entity_id: Uuid) -> AdapterResult<()>;
    async fn get_participants_for_room(&self, room_id: Uuid) -> AdapterResult<Vec<Uuid>>;
    async fn get_participants_for_entity(&self, entity_id: Uuid) -> AdapterResult<Vec<Uuid>>;
    async fn get_participant_state(&self, room_id: Uuid, entity_id: Uuid) -> AdapterResult<Option<ParticipantState>>;
    async fn set_participant_state(&self, room_id: Uuid, entity_id: Uuid, state: Option<ParticipantState>) -> AdapterResult<()>;

    // --- Memories ---
    async fn create_memory(&self, memory: Memory, table_name: &str) -> AdapterResult<Uuid>;
    async fn get_memories(&self, room_id: Uuid, table_name: &str, count: Option<usize>, unique_only: bool) -> AdapterResult<Vec<Memory>>;
    async fn search_memories(
        &self,
        embedding: &[f32],
        room_id: Option<Uuid>,
        table_name: &str,
        match_threshold: f32,
        count: usize,
    ) -> AdapterResult<Vec<Memory>>;
    async fn update_memory(&self, memory: Memory, table_name: &str) -> AdapterResult<()>;
    async fn delete_memory(&self, id: Uuid, table_name: &str) -> AdapterResult<()>;
    async fn delete_all_memories_for_room(&self, room_id: Uuid, table_name: &str) -> AdapterResult<()>;

    // --- Relationships ---
    async fn create_relationship(&self, relationship: Relationship) -> AdapterResult<Uuid>;
    async fn get_relationships(&self, entity_id: Uuid, tags: &[String]) -> AdapterResult<Vec<Relationship>>;
    async fn get_relationship_pair(&self, source_entity_id: Uuid, target_entity_id: Uuid) -> AdapterResult<Option<Relationship>>;
    async fn update_relationship(&self, relationship: Relationship) -> AdapterResult<()>;

    // --- Tasks ---
    async fn create_task(&self, task: Task) -> AdapterResult<Uuid>;
    async fn get_task(&self, id: Uuid) -> AdapterResult<Option<Task>>;
    async fn get_tasks_by_name(&self, name: &str) -> AdapterResult<Vec<Task>>;
    async fn get_tasks(&self, room_id: Option<Uuid>, tags: &[String]) -> AdapterResult<Vec<Task>>;
    async fn update_task(&self, task: Task) -> AdapterResult<()>;
    async fn delete_task(&self, id: Uuid) -> AdapterResult<()>;

    // --- Cache ---
    async fn cache_get(&self, key: &str) -> AdapterResult<Option<Value>>;
    async fn cache_set(&self, key: &str, value: Value, ttl_ms: Option<u64>) -> AdapterResult<()>;
    async fn cache_delete(&self, key: &str) -> AdapterResult<()>;

    // --- Agent row ---
    async fn get_agent(&self, id: Uuid) -> AdapterResult<Option<Value>>;
    async fn upsert_agent(&self, id: Uuid, row: Value) -> AdapterResult<()>;

    // --- Embedding dimension ---
    /// Sets the dimension on first call; subsequent calls with a different
    /// `n` reject. `get_embedding_dimension` exposes the immutable value.
    async fn ensure_embedding_dimension(&self, n: usize) -> AdapterResult<()>;
    async fn get_embedding_dimension(&self) -> AdapterResult<Option<usize>>;
}
