//! Task scheduler: fires one-shot, recurring, and choice-awaiting tasks
//! with at-least-once semantics, grounded on the same tick/poll shape the
//! durable worker pollers use, adapted to an in-process task store instead
//! of a persisted queue.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use runtime_contracts::Task;
use serde_json::{Map, Value};
use tokio::sync::{Mutex, RwLock};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::error::SchedulerError;

/// A unit of work a task dispatches to, looked up by `Task.name`.
#[async_trait]
pub trait TaskWorker: Send + Sync {
    /// Optional pre-dispatch check; default accepts every due task.
    async fn validate(&self, _task: &Task) -> bool {
        true
    }

    /// Run the task. Workers are expected to be idempotent: at-least-once
    /// delivery means a crash between dispatch and `updated_at` persist
    /// can cause a rerun.
    async fn execute(&self, task: &Task, options: &Map<String, Value>) -> anyhow::Result<()>;
}

/// Abstraction over task persistence so the scheduler stays storage-agnostic,
/// the same split the runtime draws between planner and adapter.
#[async_trait]
pub trait TaskStore: Send + Sync {
    async fn create(&self, task: Task) -> Uuid;
    async fn get(&self, id: Uuid) -> Option<Task>;
    async fn list(&self) -> Vec<Task>;
    async fn update(&self, task: Task);
    async fn delete(&self, id: Uuid);
}

/// In-memory task store, the default used outside of a full adapter-backed
/// runtime (tests, and any plugin that doesn't need task durability).
#[derive(Default)]
pub struct InMemoryTaskStore {
    tasks: RwLock<HashMap<Uuid, Task>>,
}

#[async_trait]
impl TaskStore for InMemoryTaskStore {
    async fn create(&self, task: Task) -> Uuid {
        let id = task.id;
        self.tasks.write().await.insert(id, task);
        id
    }

    async fn get(&self, id: Uuid) -> Option<Task> {
        self.tasks.read().await.get(&id).cloned()
    }

    async fn list(&self) -> Vec<Task> {
        self.tasks.read().await.values().cloned().collect()
    }

    async fn update(&self, task: Task) {
        self.tasks.write().await.insert(task.id, task);
    }

    async fn delete(&self, id: Uuid) {
        self.tasks.write().await.remove(&id);
    }
}

pub struct TaskScheduler {
    store: Arc<dyn TaskStore>,
    workers: RwLock<HashMap<String, Arc<dyn TaskWorker>>>,
    /// Guards against a second tick dispatching the same task name while
    /// an earlier dispatch is still in flight.
    in_flight: Mutex<HashSet<String>>,
}

impl TaskScheduler {
    pub fn new(store: Arc<dyn TaskStore>) -> Self {
        Self {
            store,
            workers: RwLock::new(HashMap::new()),
            in_flight: Mutex::new(HashSet::new()),
        }
    }

    pub async fn register_task_worker(&self, name: impl Into<String>, worker: Arc<dyn TaskWorker>) {
        self.workers.write().await.insert(name.into(), worker);
    }

    pub async fn get_task_worker(&self, name: &str) -> Option<Arc<dyn TaskWorker>> {
        self.workers.read().await.get(name).cloned()
    }

    pub async fn create_task(&self, task: Task) -> Uuid {
        self.store.create(task).await
    }

    pub async fn get_tasks(&self) -> Vec<Task> {
        self.store.list().await
    }

    pub async fn delete_task(&self, id: Uuid) -> Result<(), SchedulerError> {
        if self.store.get(id).await.is_none() {
            return Err(SchedulerError::TaskNotFound(id));
        }
        self.store.delete(id).await;
        Ok(())
    }

    /// Invoke a choice task's worker with the option the user picked,
    /// without waiting for a tick.
    pub async fn resolve_choice(&self, id: Uuid, option: impl Into<String>) -> Result<(), SchedulerError> {
        let task = self.store.get(id).await.ok_or(SchedulerError::TaskNotFound(id))?;
        let worker = self
            .get_task_worker(&task.name)
            .await
            .ok_or_else(|| SchedulerError::NoWorker(task.name.clone()))?;

        let mut options = task.metadata.extra.clone();
        options.insert("choice".into(), Value::String(option.into()));
        self.dispatch(&task, worker, options).await
    }

    /// One scan over due tasks. Intended to run on a periodic interval
    /// (the runtime wraps this in a `tokio::time::interval` loop); kept as
    /// a single scan here so tests can drive it deterministically.
    pub async fn tick(&self) {
        let now = Utc::now();
        for task in self.store.list().await {
            if !task.is_due(now) {
                continue;
            }

            let Some(worker) = self.get_task_worker(&task.name).await else {
                warn!(task_name = %task.name, "no worker registered for due task");
                continue;
            };

            {
                let mut in_flight = self.in_flight.lock().await;
                if in_flight.contains(&task.name) {
                    continue;
                }
                in_flight.insert(task.name.clone());
            }

            if !worker.validate(&task).await {
                self.in_flight.lock().await.remove(&task.name);
                continue;
            }

            let options = task.metadata.extra.clone();
            let result = self.dispatch(&task, worker, options).await;
            self.in_flight.lock().await.remove(&task.name);

            if let Err(e) = result {
                error!(task_name = %task.name, error = %e, "task worker failed, leaving updatedAt unchanged for retry");
            }
        }
    }

    async fn dispatch(
        &self,
        task: &Task,
        worker: Arc<dyn TaskWorker>,
        options: Map<String, Value>,
    ) -> Result<(), SchedulerError> {
        match worker.execute(task, &options).await {
            Ok(()) => {
                if task.is_recurring() {
                    let mut updated = task.clone();
                    updated.metadata.updated_at = Some(Utc::now());
                    self.store.update(updated).await;
                }
                info!(task_id = %task.id, task_name = %task.name, "task dispatched");
                Ok(())
            }
            Err(e) => Err(SchedulerError::WorkerFailed {
                task_id: task.id,
                message: e.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct CountingWorker {
        count: Arc<AtomicU32>,
    }

    #[async_trait]
    impl TaskWorker for CountingWorker {
        async fn execute(&self, _task: &Task, _options: &Map<String, Value>) -> anyhow::Result<()> {
            self.count.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct FailingWorker;

    #[async_trait]
    impl TaskWorker for FailingWorker {
        async fn execute(&self, _task: &Task, _options: &Map<String, Value>) -> anyhow::Result<()> {
            anyhow::bail!("always fails")
        }
    }

    fn recurring_task(name: &str, interval_ms: i64) -> Task {
        let mut task = Task::recurring(name, interval_ms as u64);
        task.metadata.updated_at = Some(Utc::now() - Duration::milliseconds(interval_ms + 1));
        task
    }

    #[tokio::test]
    async fn recurring_task_dispatches_once_per_due_tick() {
        let store = Arc::new(InMemoryTaskStore::default());
        let scheduler = TaskScheduler::new(store);
        let count = Arc::new(AtomicU32::new(0));
        scheduler
            .register_task_worker("REPORT", Arc::new(CountingWorker { count: Arc::clone(&count) }))
            .await;
        scheduler.create_task(recurring_task("REPORT", 1000)).await;

        scheduler.tick().await;
        assert_eq!(count.load(Ordering::SeqCst), 1);

        // Not due again immediately after updatedAt advanced.
        scheduler.tick().await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failed_dispatch_leaves_updated_at_unchanged_for_retry() {
        let store = Arc::new(InMemoryTaskStore::default());
        let scheduler = TaskScheduler::new(Arc::clone(&store) as Arc<dyn TaskStore>);
        scheduler.register_task_worker("FLAKY", Arc::new(FailingWorker)).await;
        let task = recurring_task("FLAKY", 1000);
        let task_id = task.id;
        scheduler.create_task(task).await;

        scheduler.tick().await;
        let persisted = store.get(task_id).await.unwrap();
        assert!(persisted.is_due(Utc::now()));
    }

    #[tokio::test]
    async fn missing_worker_does_not_panic_and_leaves_task_due() {
        let store = Arc::new(InMemoryTaskStore::default());
        let scheduler = TaskScheduler::new(Arc::clone(&store) as Arc<dyn TaskStore>);
        let task = recurring_task("NO_WORKER", 1000);
        let task_id = task.id;
        scheduler.create_task(task).await;

        scheduler.tick().await;
        assert!(store.get(task_id).await.unwrap().is_due(Utc::now()));
    }

    #[tokio::test]
    async fn recurring_task_dispatches_three_to_four_times_over_3500ms() {
        let store = Arc::new(InMemoryTaskStore::default());
        let scheduler = Arc::new(TaskScheduler::new(Arc::clone(&store) as Arc<dyn TaskStore>));
        let count = Arc::new(AtomicU32::new(0));
        scheduler
            .register_task_worker("REPORT", Arc::new(CountingWorker { count: Arc::clone(&count) }))
            .await;
        let task_id = scheduler.create_task(Task::recurring("REPORT", 1000)).await;

        let mut last_updated_at = None;
        let deadline = tokio::time::Instant::now() + tokio::time::Duration::from_millis(3500);
        while tokio::time::Instant::now() < deadline {
            scheduler.tick().await;
            if let Some(updated_at) = store.get(task_id).await.and_then(|t| t.metadata.updated_at) {
                if let Some(previous) = last_updated_at {
                    assert!(updated_at >= previous, "updatedAt must advance monotonically");
                }
                last_updated_at = Some(updated_at);
            }
            tokio::time::sleep(tokio::time::Duration::from_millis(50)).await;
        }

        let dispatches = count.load(Ordering::SeqCst);
        assert!((3..=4).contains(&dispatches), "expected 3-4 dispatches over 3.5s, got {dispatches}");
    }

    #[tokio::test]
    async fn deleting_an_unknown_task_errors() {
        let store = Arc::new(InMemoryTaskStore::default());
        let scheduler = TaskScheduler::new(store);
        let err = scheduler.delete_task(Uuid::now_v7()).await.unwrap_err();
        assert!(matches!(err, SchedulerError::TaskNotFound(_)));
    }

    #[tokio::test]
    async fn one_shot_task_is_removed_by_its_own_worker() {
        struct SelfDeletingWorker {
            scheduler: std::sync::Weak<TaskScheduler>,
        }

        #[async_trait]
        impl TaskWorker for SelfDeletingWorker {
            async fn execute(&self, task: &Task, _options: &Map<String, Value>) -> anyhow::Result<()> {
                if let Some(scheduler) = self.scheduler.upgrade() {
                    scheduler.delete_task(task.id).await.ok();
                }
                Ok(())
            }
        }

        let store = Arc::new(InMemoryTaskStore::default());
        let scheduler = Arc::new(TaskScheduler::new(store.clone() as Arc<dyn TaskStore>));
        scheduler
            .register_task_worker(
                "ONE_SHOT",
                Arc::new(SelfDeletingWorker {
                    scheduler: Arc::downgrade(&scheduler),
                }),
            )
            .await;
        let mut task = Task::new("ONE_SHOT");
        task.metadata.scheduled_for = Some(Utc::now() - Duration::milliseconds(1));
        let task_id = task.id;
        scheduler.create_task(task).await;

        scheduler.tick().await;
        assert!(store.get(task_id).await.is_none());

        scheduler.tick().await;
    }
}
