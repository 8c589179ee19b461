// Shared data model for the agent runtime core
//
// This crate carries no behavior - only the serializable shapes the core,
// planner, and any plugin crate agree on. Keeping it dependency-free of
// the runtime lets plugin crates depend on it without pulling in the
// registry, loader, or executor.

pub mod action;
pub mod content;
pub mod entity;
pub mod events;
pub mod ids;
pub mod memory;
pub mod model;
pub mod plan;
pub mod relationship;
pub mod room;
pub mod task;

pub use action::{ActionDescriptor, ActionEffects, ActionExample, ActionResult, ExampleTurn};
pub use content::{Attachment, Content};
pub use entity::{Component, ComponentScope, Entity};
pub use events::{topics, EventPayload};
pub use ids::unique_id;
pub use memory::{Memory, MemoryKind, MemoryMetadata, MemoryScope};
pub use model::{ModelInvocationLog, ModelType};
pub use plan::{ActionPlan, ExecutionModel, PlanExecutionResult, PlanStep, StepErrorPolicy, StepOutcome};
pub use relationship::{Relationship, RelationshipMetadata};
pub use room::{ParticipantState, Room, RoomType, World, WorldMetadata, WorldRole};
pub use task::{Task, TaskMetadata};

pub use uuid::Uuid;
