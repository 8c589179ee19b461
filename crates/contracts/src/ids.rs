// Identifiers
//
// All identifiers in the runtime are 128-bit UUIDs presented as canonical
// hyphenated strings. `unique_id` derives a stable per-agent identity from
// an external platform id so the same external user always maps to the
// same entity, across processes and restarts.

use uuid::Uuid;

/// Namespace used to derive deterministic entity ids from (agent, external id)
/// pairs. Fixed so `unique_id` is a pure function across processes.
const AGENT_ENTITY_NAMESPACE: Uuid = Uuid::from_bytes([
    0x9e, 0x2b, 0x4a, 0x10, 0x7c, 0x3d, 0x4f, 0x8e, 0xb1, 0x02, 0x6a, 0x5d, 0x91, 0xc4, 0x77, 0x3f,
]);

/// Derive a deterministic UUID from an agent id and an external id.
///
/// `unique_id(agent, x) == unique_id(agent, x)` for all `agent`, `x` - the
/// same external user always produces the same per-agent entity id.
pub fn unique_id(agent_id: Uuid, external_id: &str) -> Uuid {
    let name = format!("{agent_id}:{external_id}");
    Uuid::new_v5(&AGENT_ENTITY_NAMESPACE, name.as_bytes())
}
