// Memory - the fundamental persisted record

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::content::Content;

/// The kind of thing a memory's metadata describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryKind {
    Message,
    Document,
    Fragment,
    Description,
    Custom,
}

/// Visibility scope of a memory's metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryScope {
    Shared,
    Private,
    Room,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryMetadata {
    pub kind: MemoryKind,
    pub scope: MemoryScope,
}

/// A memory: a message, document fragment, or other unit of recorded
/// content, optionally embedded for semantic search.
///
/// `unique` deduplicates by content: the adapter should reject (or the
/// caller should skip) inserting a memory whose `(room_id, content.text)`
/// already exists when `unique` is `true`. This is the dedup policy the
/// runtime picks among the two the source used ambiguously - see DESIGN.md.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Memory {
    pub id: Uuid,
    pub entity_id: Uuid,
    pub agent_id: Uuid,
    pub room_id: Uuid,
    #[serde(default)]
    pub world_id: Option<Uuid>,
    pub content: Content,
    #[serde(default)]
    pub embedding: Option<Vec<f32>>,
    pub created_at: DateTime<Utc>,
    #[serde(default = "default_unique")]
    pub unique: bool,
    #[serde(default)]
    pub similarity: Option<f32>,
    #[serde(default)]
    pub metadata: Option<MemoryMetadata>,
}

fn default_unique() -> bool {
    true
}

impl Memory {
    pub fn new(entity_id: Uuid, agent_id: Uuid, room_id: Uuid, content: Content) -> Self {
        Self {
            id: Uuid::now_v7(),
            entity_id,
            agent_id,
            room_id,
            world_id: None,
            content,
            embedding: None,
            created_at: Utc::now(),
            unique: true,
            similarity: None,
            metadata: None,
        }
    }

    pub fn with_embedding(mut self, embedding: Vec<f32>) -> Self {
        self.embedding = Some(embedding);
        self
    }

    pub fn with_metadata(mut self, kind: MemoryKind, scope: MemoryScope) -> Self {
        self.metadata = Some(MemoryMetadata { kind, scope });
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_memory_is_unique_by_default() {
        let m = Memory::new(Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4(), Content::text("hi"));
        assert!(m.unique);
        assert!(m.embedding.is_none());
    }
}
