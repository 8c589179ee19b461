// Task - scheduled work dispatched by the task scheduler

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct TaskMetadata {
    /// Recurring tasks set this to re-dispatch every `update_interval_ms`.
    #[serde(default)]
    pub update_interval_ms: Option<u64>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
    /// Choice tasks carry the set of options the worker is waiting on.
    #[serde(default)]
    pub options: Option<Vec<String>>,
    #[serde(default)]
    pub scheduled_for: Option<DateTime<Utc>>,
    #[serde(default, flatten)]
    pub extra: serde_json::Map<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: Uuid,
    /// Must match a registered task worker name.
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub room_id: Option<Uuid>,
    #[serde(default)]
    pub world_id: Option<Uuid>,
    #[serde(default)]
    pub entity_id: Option<Uuid>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub metadata: TaskMetadata,
}

impl Task {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: Uuid::now_v7(),
            name: name.into(),
            description: None,
            room_id: None,
            world_id: None,
            entity_id: None,
            tags: Vec::new(),
            metadata: TaskMetadata::default(),
        }
    }

    pub fn recurring(name: impl Into<String>, update_interval_ms: u64) -> Self {
        let mut task = Self::new(name);
        task.metadata.update_interval_ms = Some(update_interval_ms);
        task.metadata.updated_at = Some(Utc::now());
        task
    }

    pub fn choice(name: impl Into<String>, options: Vec<String>) -> Self {
        let mut task = Self::new(name);
        task.metadata.options = Some(options);
        task
    }

    pub fn is_recurring(&self) -> bool {
        self.metadata.update_interval_ms.is_some()
    }

    pub fn is_choice(&self) -> bool {
        self.metadata.options.is_some()
    }

    /// `true` once `update_interval_ms` has elapsed since the last dispatch.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        match (self.metadata.update_interval_ms, self.metadata.updated_at) {
            (Some(interval_ms), Some(updated_at)) => {
                let elapsed = now.signed_duration_since(updated_at);
                elapsed.num_milliseconds() >= interval_ms as i64
            }
            // One-shots with a scheduled_for are due once that instant passes.
            (None, _) => self
                .metadata
                .scheduled_for
                .map(|t| now >= t)
                .unwrap_or(false),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;

    #[test]
    fn recurring_task_not_due_immediately() {
        let task = Task::recurring("REPORT", 1_000);
        assert!(!task.is_due(Utc::now()));
    }

    #[test]
    fn recurring_task_due_after_interval() {
        let task = Task::recurring("REPORT", 1_000);
        let later = Utc::now() + ChronoDuration::milliseconds(1_500);
        assert!(task.is_due(later));
    }

    #[test]
    fn one_shot_due_after_scheduled_for() {
        let mut task = Task::new("ONESHOT");
        task.metadata.scheduled_for = Some(Utc::now() - ChronoDuration::seconds(1));
        assert!(task.is_due(Utc::now()));
    }
}
