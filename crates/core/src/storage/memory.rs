//! An in-memory `StorageAdapter`: what a runtime without a database-backed
//! plugin falls back to, and what integration tests build against.
//! Grounded on the same `RwLock<HashMap<_>>`-per-collection shape
//! `InMemoryTaskStore` uses in the planner crate.

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::Instant;

use async_trait::async_trait;
use runtime_contracts::{Component, Entity, Memory, ParticipantState, Relationship, Room, Task, World};
use serde_json::Value;
use uuid::Uuid;

use crate::adapter::{AdapterResult, StorageAdapter};
use crate::error::AdapterError;

#[derive(Default)]
pub struct InMemoryAdapter {
    entities: RwLock<HashMap<Uuid, Entity>>,
    components: RwLock<HashMap<Uuid, Component>>,
    rooms: RwLock<HashMap<Uuid, Room>>,
    worlds: RwLock<HashMap<Uuid, World>>,
    participants: RwLock<HashMap<Uuid, HashMap<Uuid, Option<ParticipantState>>>>,
    memories: RwLock<HashMap<String, Vec<Memory>>>,
    relationships: RwLock<HashMap<Uuid, Relationship>>,
    tasks: RwLock<HashMap<Uuid, Task>>,
    cache: RwLock<HashMap<String, (Value, Option<Instant>)>>,
    agents: RwLock<HashMap<Uuid, Value>>,
    embedding_dimension: RwLock<Option<usize>>,
}

impl InMemoryAdapter {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StorageAdapter for InMemoryAdapter {
    async fn is_ready(&self) -> bool {
        true
    }

    // --- Entities ---

    async fn create_entity(&self, entity: Entity) -> AdapterResult<Uuid> {
        let id = entity.id;
        self.entities.write().expect("entities lock poisoned").insert(id, entity);
        Ok(id)
    }

    async fn get_entity_by_id(&self, id: Uuid) -> AdapterResult<Option<Entity>> {
        Ok(self.entities.read().expect("entities lock poisoned").get(&id).cloned())
    }

    async fn get_entities_by_ids(&self, ids: &[Uuid]) -> AdapterResult<Vec<Entity>> {
        let guard = self.entities.read().expect("entities lock poisoned");
        Ok(ids.iter().filter_map(|id| guard.get(id).cloned()).collect())
    }

    async fn update_entity(&self, entity: Entity) -> AdapterResult<()> {
        let mut guard = self.entities.write().expect("entities lock poisoned");
        if !guard.contains_key(&entity.id) {
            return Err(AdapterError::NotFound(entity.id.to_string()));
        }
        guard.insert(entity.id, entity);
        Ok(())
    }

    async fn get_entities_for_room(&self, room_id: Uuid) -> AdapterResult<Vec<Entity>> {
        let participant_ids: Vec<Uuid> = self
            .participants
            .read()
            .expect("participants lock poisoned")
            .get(&room_id)
            .map(|m| m.keys().cloned().collect())
            .unwrap_or_default();
        let guard = self.entities.read().expect("entities lock poisoned");
        Ok(participant_ids.iter().filter_map(|id| guard.get(id).cloned()).collect())
    }

    // --- Components ---

    async fn create_component(&self, component: Component) -> AdapterResult<Uuid> {
        let id = component.id;
        self.components.write().expect("components lock poisoned").insert(id, component);
        Ok(id)
    }

    async fn get_components(
        &self,
        entity_id: Uuid,
        component_type: &str,
        world_id: Option<Uuid>,
        source_entity_id: Option<Uuid>,
    ) -> AdapterResult<Vec<Component>> {
        let guard = self.components.read().expect("components lock poisoned");
        Ok(guard
            .values()
            .filter(|c| {
                c.entity_id == entity_id
                    && c.component_type == component_type
                    && world_id.map_or(true, |w| c.world_id == Some(w))
                    && source_entity_id.map_or(true, |s| c.source_entity_id == Some(s))
            })
            .cloned()
            .collect())
    }

    async fn update_component(&self, component: Component) -> AdapterResult<()> {
        let mut guard = self.components.write().expect("components lock poisoned");
        if !guard.contains_key(&component.id) {
            return Err(AdapterError::NotFound(component.id.to_string()));
        }
        guard.insert(component.id, component);
        Ok(())
    }

    async fn delete_component(&self, id: Uuid) -> AdapterResult<()> {
        self.components.write().expect("components lock poisoned").remove(&id);
        Ok(())
    }

    // --- Rooms / Worlds ---

    async fn create_room(&self, room: Room) -> AdapterResult<Uuid> {
        let id = room.id;
        self.rooms.write().expect("rooms lock poisoned").insert(id, room);
        Ok(id)
    }

    async fn get_room(&self, id: Uuid) -> AdapterResult<Option<Room>> {
        Ok(self.rooms.read().expect("rooms lock poisoned").get(&id).cloned())
    }

    async fn get_rooms(&self, world_id: Uuid) -> AdapterResult<Vec<Room>> {
        Ok(self
            .rooms
            .read()
            .expect("rooms lock poisoned")
            .values()
            .filter(|r| r.world_id == Some(world_id))
            .cloned()
            .collect())
    }

    async fn update_room(&self, room: Room) -> AdapterResult<()> {
        let mut guard = self.rooms.write().expect("rooms lock poisoned");
        if !guard.contains_key(&room.id) {
            return Err(AdapterError::NotFound(room.id.to_string()));
        }
        guard.insert(room.id, room);
        Ok(())
    }

    async fn delete_room(&self, id: Uuid) -> AdapterResult<()> {
        self.rooms.write().expect("rooms lock poisoned").remove(&id);
        self.participants.write().expect("participants lock poisoned").remove(&id);
        Ok(())
    }

    async fn create_world(&self, world: World) -> AdapterResult<Uuid> {
        let id = world.id;
        self.worlds.write().expect("worlds lock poisoned").insert(id, world);
        Ok(id)
    }

    async fn get_world(&self, id: Uuid) -> AdapterResult<Option<World>> {
        Ok(self.worlds.read().expect("worlds lock poisoned").get(&id).cloned())
    }

    async fn get_all_worlds(&self) -> AdapterResult<Vec<World>> {
        Ok(self.worlds.read().expect("worlds lock poisoned").values().cloned().collect())
    }

    async fn update_world(&self, world: World) -> AdapterResult<()> {
        let mut guard = self.worlds.write().expect("worlds lock poisoned");
        if !guard.contains_key(&world.id) {
            return Err(AdapterError::NotFound(world.id.to_string()));
        }
        guard.insert(world.id, world);
        Ok(())
    }

    async fn delete_world(&self, id: Uuid) -> AdapterResult<()> {
        self.worlds.write().expect("worlds lock poisoned").remove(&id);
        Ok(())
    }

    // --- Participants ---

    async fn add_participant(&self, room_id: Uuid, entity_id: Uuid) -> AdapterResult<()> {
        self.participants
            .write()
            .expect("participants lock poisoned")
            .entry(room_id)
            .or_default()
            .entry(entity_id)
            .or_insert(None);
        Ok(())
    }

    async fn remove_participant(&self, room_id: Uuid, entity_id: Uuid) -> AdapterResult<()> {
        if let Some(room) = self.participants.write().expect("participants lock poisoned").get_mut(&room_id) {
            room.remove(&entity_id);
        }
        Ok(())
    }

    async fn get_participants_for_room(&self, room_id: Uuid) -> AdapterResult<Vec<Uuid>> {
        Ok(self
            .participants
            .read()
            .expect("participants lock poisoned")
            .get(&room_id)
            .map(|m| m.keys().cloned().collect())
            .unwrap_or_default())
    }

    async fn get_participants_for_entity(&self, entity_id: Uuid) -> AdapterResult<Vec<Uuid>> {
        Ok(self
            .participants
            .read()
            .expect("participants lock poisoned")
            .iter()
            .filter(|(_, members)| members.contains_key(&entity_id))
            .map(|(room_id, _)| *room_id)
            .collect())
    }

    async fn get_participant_state(&self, room_id: Uuid, entity_id: Uuid) -> AdapterResult<Option<ParticipantState>> {
        Ok(self
            .participants
            .read()
            .expect("participants lock poisoned")
            .get(&room_id)
            .and_then(|m| m.get(&entity_id).cloned())
            .flatten())
    }

    async fn set_participant_state(&self, room_id: Uuid, entity_id: Uuid, state: Option<ParticipantState>) -> AdapterResult<()> {
        self.participants
            .write()
            .expect("participants lock poisoned")
            .entry(room_id)
            .or_default()
            .insert(entity_id, state);
        Ok(())
    }

    // --- Memories ---

    async fn create_memory(&self, memory: Memory, table_name: &str) -> AdapterResult<Uuid> {
        let mut guard = self.memories.write().expect("memories lock poisoned");
        let table = guard.entry(table_name.to_string()).or_default();

        if memory.unique {
            if let Some(existing) = table.iter().find(|m| {
                m.room_id == memory.room_id
                    && m.content.text == memory.content.text
                    && m.content.source == memory.content.source
            }) {
                return Ok(existing.id);
            }
        }

        let id = memory.id;
        table.push(memory);
        Ok(id)
    }

    async fn get_memories(&self, room_id: Uuid, table_name: &str, count: Option<usize>, unique_only: bool) -> AdapterResult<Vec<Memory>> {
        let guard = self.memories.read().expect("memories lock poisoned");
        let mut results: Vec<Memory> = guard
            .get(table_name)
            .map(|table| {
                table
                    .iter()
                    .filter(|m| m.room_id == room_id && (!unique_only || m.unique))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        results.sort_by_key(|m| m.created_at);
        results.reverse();
        if let Some(count) = count {
            results.truncate(count);
        }
        Ok(results)
    }

    async fn search_memories(
        &self,
        embedding: &[f32],
        room_id: Option<Uuid>,
        table_name: &str,
        match_threshold: f32,
        count: usize,
    ) -> AdapterResult<Vec<Memory>> {
        let guard = self.memories.read().expect("memories lock poisoned");
        let mut scored: Vec<(f32, Memory)> = guard
            .get(table_name)
            .map(|table| {
                table
                    .iter()
                    .filter(|m| room_id.map_or(true, |r| m.room_id == r))
                    .filter_map(|m| {
                        let similarity = cosine_similarity(embedding, m.embedding.as_deref()?);
                        (similarity >= match_threshold).then(|| (similarity, m.clone()))
                    })
                    .collect()
            })
            .unwrap_or_default();

        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(count);
        Ok(scored
            .into_iter()
            .map(|(similarity, mut m)| {
                m.similarity = Some(similarity);
                m
            })
            .collect())
    }

    async fn update_memory(&self, memory: Memory, table_name: &str) -> AdapterResult<()> {
        let mut guard = self.memories.write().expect("memories lock poisoned");
        let table = guard.entry(table_name.to_string()).or_default();
        match table.iter_mut().find(|m| m.id == memory.id) {
            Some(slot) => {
                *slot = memory;
                Ok(())
            }
            None => Err(AdapterError::NotFound(memory.id.to_string())),
        }
    }

    async fn delete_memory(&self, id: Uuid, table_name: &str) -> AdapterResult<()> {
        if let Some(table) = self.memories.write().expect("memories lock poisoned").get_mut(table_name) {
            table.retain(|m| m.id != id);
        }
        Ok(())
    }

    async fn delete_all_memories_for_room(&self, room_id: Uuid, table_name: &str) -> AdapterResult<()> {
        if let Some(table) = self.memories.write().expect("memories lock poisoned").get_mut(table_name) {
            table.retain(|m| m.room_id != room_id);
        }
        Ok(())
    }

    // --- Relationships ---

    async fn create_relationship(&self, relationship: Relationship) -> AdapterResult<Uuid> {
        let id = relationship.id;
        self.relationships.write().expect("relationships lock poisoned").insert(id, relationship);
        Ok(id)
    }

    async fn get_relationships(&self, entity_id: Uuid, tags: &[String]) -> AdapterResult<Vec<Relationship>> {
        Ok(self
            .relationships
            .read()
            .expect("relationships lock poisoned")
            .values()
            .filter(|r| {
                (r.source_entity_id == entity_id || r.target_entity_id == entity_id)
                    && (tags.is_empty() || tags.iter().any(|t| r.tags.contains(t)))
            })
            .cloned()
            .collect())
    }

    async fn get_relationship_pair(&self, source_entity_id: Uuid, target_entity_id: Uuid) -> AdapterResult<Option<Relationship>> {
        Ok(self
            .relationships
            .read()
            .expect("relationships lock poisoned")
            .values()
            .find(|r| r.source_entity_id == source_entity_id && r.target_entity_id == target_entity_id)
            .cloned())
    }

    async fn update_relationship(&self, relationship: Relationship) -> AdapterResult<()> {
        let mut guard = self.relationships.write().expect("relationships lock poisoned");
        if !guard.contains_key(&relationship.id) {
            return Err(AdapterError::NotFound(relationship.id.to_string()));
        }
        guard.insert(relationship.id, relationship);
        Ok(())
    }

    // --- Tasks ---

    async fn create_task(&self, task: Task) -> AdapterResult<Uuid> {
        let id = task.id;
        self.tasks.write().expect("tasks lock poisoned").insert(id, task);
        Ok(id)
    }

    async fn get_task(&self, id: Uuid) -> AdapterResult<Option<Task>> {
        Ok(self.tasks.read().expect("tasks lock poisoned").get(&id).cloned())
    }

    async fn get_tasks_by_name(&self, name: &str) -> AdapterResult<Vec<Task>> {
        Ok(self
            .tasks
            .read()
            .expect("tasks lock poisoned")
            .values()
            .filter(|t| t.name == name)
            .cloned()
            .collect())
    }

    async fn get_tasks(&self, room_id: Option<Uuid>, tags: &[String]) -> AdapterResult<Vec<Task>> {
        Ok(self
            .tasks
            .read()
            .expect("tasks lock poisoned")
            .values()
            .filter(|t| room_id.map_or(true, |r| t.room_id == Some(r)) && (tags.is_empty() || tags.iter().any(|tag| t.tags.contains(tag))))
            .cloned()
            .collect())
    }

    async fn update_task(&self, task: Task) -> AdapterResult<()> {
        let mut guard = self.tasks.write().expect("tasks lock poisoned");
        if !guard.contains_key(&task.id) {
            return Err(AdapterError::NotFound(task.id.to_string()));
        }
        guard.insert(task.id, task);
        Ok(())
    }

    async fn delete_task(&self, id: Uuid) -> AdapterResult<()> {
        self.tasks.write().expect("tasks lock poisoned").remove(&id);
        Ok(())
    }

    // --- Cache ---

    async fn cache_get(&self, key: &str) -> AdapterResult<Option<Value>> {
        let mut guard = self.cache.write().expect("cache lock poisoned");
        match guard.get(key) {
            Some((_, Some(expires_at))) if Instant::now() >= *expires_at => {
                guard.remove(key);
                Ok(None)
            }
            Some((value, _)) => Ok(Some(value.clone())),
            None => Ok(None),
        }
    }

    async fn cache_set(&self, key: &str, value: Value, ttl_ms: Option<u64>) -> AdapterResult<()> {
        let expires_at = ttl_ms.map(|ms| Instant::now() + std::time::Duration::from_millis(ms));
        self.cache.write().expect("cache lock poisoned").insert(key.to_string(), (value, expires_at));
        Ok(())
    }

    async fn cache_delete(&self, key: &str) -> AdapterResult<()> {
        self.cache.write().expect("cache lock poisoned").remove(key);
        Ok(())
    }

    // --- Agent row ---

    async fn get_agent(&self, id: Uuid) -> AdapterResult<Option<Value>> {
        Ok(self.agents.read().expect("agents lock poisoned").get(&id).cloned())
    }

    async fn upsert_agent(&self, id: Uuid, row: Value) -> AdapterResult<()> {
        self.agents.write().expect("agents lock poisoned").insert(id, row);
        Ok(())
    }

    // --- Embedding dimension ---

    async fn ensure_embedding_dimension(&self, n: usize) -> AdapterResult<()> {
        let mut guard = self.embedding_dimension.write().expect("embedding dimension lock poisoned");
        match *guard {
            Some(existing) if existing != n => Err(AdapterError::Conflict(format!(
                "embedding dimension already set to {existing}, cannot change to {n}"
            ))),
            Some(_) => Ok(()),
            None => {
                *guard = Some(n);
                Ok(())
            }
        }
    }

    async fn get_embedding_dimension(&self) -> AdapterResult<Option<usize>> {
        Ok(*self.embedding_dimension.read().expect("embedding dimension lock poisoned"))
    }
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

#[cfg(test)]
mod tests {
    use super::*;
    use runtime_contracts::Content;

    fn sample_memory(room_id: Uuid, text: &str) -> Memory {
        Memory::new(Uuid::new_v4(), Uuid::new_v4(), room_id, Content::text(text))
    }

    #[tokio::test]
    async fn duplicate_unique_memory_returns_existing_id() {
        let adapter = InMemoryAdapter::new();
        let room_id = Uuid::new_v4();
        let first = sample_memory(room_id, "hello");
        let first_id = adapter.create_memory(first.clone(), "messages").await.unwrap();

        let duplicate = sample_memory(room_id, "hello");
        let second_id = adapter.create_memory(duplicate, "messages").await.unwrap();

        assert_eq!(first_id, second_id);
        assert_eq!(adapter.get_memories(room_id, "messages", None, false).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn non_unique_memory_is_not_deduplicated() {
        let adapter = InMemoryAdapter::new();
        let room_id = Uuid::new_v4();
        let mut first = sample_memory(room_id, "hello");
        first.unique = false;
        let mut second = sample_memory(room_id, "hello");
        second.unique = false;

        adapter.create_memory(first, "messages").await.unwrap();
        adapter.create_memory(second, "messages").await.unwrap();

        assert_eq!(adapter.get_memories(room_id, "messages", None, false).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn search_memories_ranks_by_cosine_similarity() {
        let adapter = InMemoryAdapter::new();
        let room_id = Uuid::new_v4();

        let mut close = sample_memory(room_id, "close");
        close.embedding = Some(vec![1.0, 0.0, 0.0]);
        let mut far = sample_memory(room_id, "far");
        far.embedding = Some(vec![0.0, 1.0, 0.0]);

        adapter.create_memory(close, "messages").await.unwrap();
        adapter.create_memory(far, "messages").await.unwrap();

        let results = adapter
            .search_memories(&[1.0, 0.0, 0.0], Some(room_id), "messages", 0.5, 10)
            .await
            .unwrap();

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].content.text.as_deref(), Some("close"));
    }

    #[tokio::test]
    async fn embedding_dimension_locks_in_after_first_call() {
        let adapter = InMemoryAdapter::new();
        adapter.ensure_embedding_dimension(1536).await.unwrap();
        let err = adapter.ensure_embedding_dimension(768).await.unwrap_err();
        assert!(matches!(err, AdapterError::Conflict(_)));
    }

    #[tokio::test]
    async fn participant_state_defaults_to_none_on_join() {
        let adapter = InMemoryAdapter::new();
        let room_id = Uuid::new_v4();
        let entity_id = Uuid::new_v4();
        adapter.add_participant(room_id, entity_id).await.unwrap();
        assert_eq!(adapter.get_participant_state(room_id, entity_id).await.unwrap(), None);
        assert_eq!(adapter.get_participants_for_room(room_id).await.unwrap(), vec![entity_id]);
    }

    #[tokio::test]
    async fn create_entity_then_get_by_id_is_identity_on_persisted_fields() {
        let adapter = InMemoryAdapter::new();
        let agent_id = Uuid::new_v4();
        let entity = runtime_contracts::Entity::new(Uuid::new_v4(), agent_id, "Alice");
        let entity_id = adapter.create_entity(entity.clone()).await.unwrap();

        let fetched = adapter.get_entity_by_id(entity_id).await.unwrap().unwrap();
        assert_eq!(fetched.id, entity.id);
        assert_eq!(fetched.names, entity.names);
        assert_eq!(fetched.agent_id, entity.agent_id);
        assert!(adapter.get_entity_by_id(Uuid::new_v4()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn create_room_then_get_is_identity_and_survives_a_world() {
        let adapter = InMemoryAdapter::new();
        let world = runtime_contracts::World::new(Uuid::new_v4(), "test-world");
        let world_id = adapter.create_world(world).await.unwrap();
        let mut room = runtime_contracts::Room::new("discord", runtime_contracts::RoomType::Group);
        room.world_id = Some(world_id);
        let room_id = adapter.create_room(room.clone()).await.unwrap();

        let fetched = adapter.get_room(room_id).await.unwrap().unwrap();
        assert_eq!(fetched.id, room.id);
        assert_eq!(fetched.world_id, Some(world_id));
        assert_eq!(adapter.get_rooms(world_id).await.unwrap().len(), 1);
    }
}
