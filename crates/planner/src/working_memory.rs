//! Working memory - a per-plan key-value arena.
//!
//! Owned by the `PlanExecutionContext` and dropped with it when the plan
//! ends. Never exposed as a global; cross-plan sharing goes through
//! memories or services instead.

use serde_json::Value;
use std::collections::HashMap;
use std::sync::RwLock;

#[derive(Debug, Default)]
pub struct WorkingMemory {
    entries: RwLock<HashMap<String, Value>>,
}

impl WorkingMemory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed working memory from prior conversation context (e.g. when a
    /// plan starts mid-session, or when replanning carries state forward).
    pub fn from_map(entries: HashMap<String, Value>) -> Self {
        Self {
            entries: RwLock::new(entries),
        }
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.entries.read().expect("working memory lock poisoned").get(key).cloned()
    }

    pub fn set(&self, key: impl Into<String>, value: Value) {
        self.entries
            .write()
            .expect("working memory lock poisoned")
            .insert(key.into(), value);
    }

    pub fn has(&self, key: &str) -> bool {
        self.entries.read().expect("working memory lock poisoned").contains_key(key)
    }

    /// A point-in-time copy of everything currently stored, for the
    /// `PlanExecutionResult.working_memory_snapshot` field and for carrying
    /// state into a replan.
    pub fn snapshot(&self) -> HashMap<String, Value> {
        self.entries.read().expect("working memory lock poisoned").clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn set_then_get_round_trips() {
        let wm = WorkingMemory::new();
        wm.set("fetchedData", json!([1, 2, 3]));
        assert_eq!(wm.get("fetchedData"), Some(json!([1, 2, 3])));
    }

    #[test]
    fn has_reflects_presence() {
        let wm = WorkingMemory::new();
        assert!(!wm.has("x"));
        wm.set("x", json!(1));
        assert!(wm.has("x"));
    }

    #[test]
    fn snapshot_is_a_copy() {
        let wm = WorkingMemory::new();
        wm.set("a", json!(1));
        let snap = wm.snapshot();
        wm.set("a", json!(2));
        assert_eq!(snap.get("a"), Some(&json!(1)));
        assert_eq!(wm.get("a"), Some(json!(2)));
    }

    #[test]
    fn from_map_seeds_entries() {
        let mut seed = HashMap::new();
        seed.insert("prior".to_string(), json!("context"));
        let wm = WorkingMemory::from_map(seed);
        assert_eq!(wm.get("prior"), Some(json!("context")));
    }
}
