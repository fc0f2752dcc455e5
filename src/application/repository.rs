use std::sync::Arc;

use crate::domain::state::SupervisorState;
use crate::domain::task::Task;
use crate::error::{Result, SupervisorError};
use crate::ports::StateStore;

/// Wraps the raw `StateStore` string key with `SupervisorState`
/// serialization. The only writer path: `load` then `save` a freshly
/// constructed value — callers never mutate a state value they didn't
/// just load.
pub struct StateRepository {
    store: Arc<dyn StateStore>,
    key: String,
}

impl StateRepository {
    #[must_use]
    pub fn new(store: Arc<dyn StateStore>, key: impl Into<String>) -> Self {
        Self { store, key: key.into() }
    }

    pub async fn load(&self) -> Result<Option<SupervisorState>> {
        match self.store.get(&self.key).await? {
            Some(raw) => {
                let state = serde_json::from_str(&raw)
                    .map_err(|e| SupervisorError::IntegrityViolation(format!("state deserialization failed: {e}")))?;
                Ok(Some(state))
            }
            None => Ok(None),
        }
    }

    pub async fn save(&self, state: &SupervisorState) -> Result<()> {
        let raw = serde_json::to_string(state).map_err(|e| SupervisorError::Internal(format!("state serialization failed: {e}")))?;
        self.store.set(&self.key, raw).await
    }

    pub async fn exists(&self) -> Result<bool> {
        Ok(self.store.get(&self.key).await?.is_some())
    }
}

/// The FIFO task queue: enqueue/dequeue only, never reordered, never
/// mutated in place.
pub struct TaskQueueRepository {
    store: Arc<dyn StateStore>,
    key: String,
}

impl TaskQueueRepository {
    #[must_use]
    pub fn new(store: Arc<dyn StateStore>, key: impl Into<String>) -> Self {
        Self { store, key: key.into() }
    }

    pub async fn enqueue(&self, task: &Task) -> Result<()> {
        let raw = serde_json::to_string(task).map_err(|e| SupervisorError::TaskSchemaInvalid(e.to_string()))?;
        self.store.list_push_back(&self.key, raw).await
    }

    /// Dequeues the head of the queue. The bytes returned are exactly
    /// the bytes a prior `enqueue` wrote — no field is touched in
    /// between.
    pub async fn dequeue(&self) -> Result<Option<Task>> {
        match self.store.list_pop_front(&self.key).await? {
            Some(raw) => {
                let task = serde_json::from_str(&raw)
                    .map_err(|e| SupervisorError::IntegrityViolation(format!("queued task deserialization failed: {e}")))?;
                Ok(Some(task))
            }
            None => Ok(None),
        }
    }

    pub async fn len(&self) -> Result<usize> {
        self.store.list_len(&self.key).await
    }

    pub async fn is_empty(&self) -> Result<bool> {
        Ok(self.len().await? == 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::state::ExecutionMode;
    use crate::infrastructure::state_store::InMemoryStateStore;

    #[tokio::test]
    async fn state_round_trips_through_repository() {
        let store: Arc<dyn StateStore> = Arc::new(InMemoryStateStore::new());
        let repo = StateRepository::new(store, "supervisor:state");
        assert!(repo.load().await.unwrap().is_none());

        let state = SupervisorState::new(ExecutionMode::Auto);
        repo.save(&state).await.unwrap();
        let loaded = repo.load().await.unwrap().unwrap();
        assert_eq!(loaded.execution_mode, state.execution_mode);
    }

    #[tokio::test]
    async fn queue_preserves_byte_identity_across_dequeue() {
        let store: Arc<dyn StateStore> = Arc::new(InMemoryStateStore::new());
        let queue = TaskQueueRepository::new(store, "queue:tasks");
        let task = Task::new("t-001", "Create utils file", "claude").with_acceptance_criteria(vec!["x".into()]);
        queue.enqueue(&task).await.unwrap();
        let dequeued = queue.dequeue().await.unwrap().unwrap();
        assert_eq!(dequeued.task_id, task.task_id);
        assert_eq!(dequeued.intent, task.intent);
        assert!(queue.is_empty().await.unwrap());
    }

    #[tokio::test]
    async fn queue_is_strictly_fifo() {
        let store: Arc<dyn StateStore> = Arc::new(InMemoryStateStore::new());
        let queue = TaskQueueRepository::new(store, "queue:tasks");
        for i in 0..3 {
            let task = Task::new(format!("t-{i}"), "x", "claude").with_acceptance_criteria(vec!["y".into()]);
            queue.enqueue(&task).await.unwrap();
        }
        for i in 0..3 {
            let task = queue.dequeue().await.unwrap().unwrap();
            assert_eq!(task.task_id, format!("t-{i}"));
        }
    }
}
