use serde::{Deserialize, Serialize};

use crate::application::repository::TaskQueueRepository;
use crate::domain::state::SupervisorState;
use crate::domain::task::Task;
use crate::error::Result;

/// Where a retrieved task came from — recorded in the audit log,
/// per the retriever's contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskSource {
    CurrentTask,
    RetrySlot,
    Queue,
}

/// Selects the next task with strict precedence: in-flight recovery →
/// retry slot → queue head. No reordering, filtering, or batching.
pub async fn retrieve_next(state: &mut SupervisorState, queue: &TaskQueueRepository) -> Result<Option<(Task, TaskSource)>> {
    if let Some(task) = state.current_task.take() {
        state.current_task = Some(task.clone());
        return Ok(Some((task, TaskSource::CurrentTask)));
    }
    if let Some(task) = state.retry_slot.take() {
        state.current_task = Some(task.clone());
        return Ok(Some((task, TaskSource::RetrySlot)));
    }
    match queue.dequeue().await? {
        Some(task) => {
            state.current_task = Some(task.clone());
            Ok(Some((task, TaskSource::Queue)))
        }
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::state::ExecutionMode;
    use crate::infrastructure::state_store::InMemoryStateStore;
    use crate::ports::StateStore;
    use std::sync::Arc;

    fn queue() -> TaskQueueRepository {
        let store: Arc<dyn StateStore> = Arc::new(InMemoryStateStore::new());
        TaskQueueRepository::new(store, "queue:tasks")
    }

    #[tokio::test]
    async fn recovers_in_flight_task_first() {
        let mut state = SupervisorState::new(ExecutionMode::Auto);
        state.current_task = Some(Task::new("t-in-flight", "x", "claude"));
        let (task, source) = retrieve_next(&mut state, &queue()).await.unwrap().unwrap();
        assert_eq!(task.task_id, "t-in-flight");
        assert_eq!(source, TaskSource::CurrentTask);
    }

    #[tokio::test]
    async fn prefers_retry_slot_over_queue() {
        let mut state = SupervisorState::new(ExecutionMode::Auto);
        state.retry_slot = Some(Task::new("t-retry", "x", "claude"));
        let q = queue();
        q.enqueue(&Task::new("t-queued", "y", "claude").with_acceptance_criteria(vec!["z".into()])).await.unwrap();
        let (task, source) = retrieve_next(&mut state, &q).await.unwrap().unwrap();
        assert_eq!(task.task_id, "t-retry");
        assert_eq!(source, TaskSource::RetrySlot);
        assert!(state.retry_slot.is_none());
    }

    #[tokio::test]
    async fn falls_back_to_queue_head() {
        let mut state = SupervisorState::new(ExecutionMode::Auto);
        let q = queue();
        q.enqueue(&Task::new("t-001", "y", "claude").with_acceptance_criteria(vec!["z".into()])).await.unwrap();
        let (task, source) = retrieve_next(&mut state, &q).await.unwrap().unwrap();
        assert_eq!(task.task_id, "t-001");
        assert_eq!(source, TaskSource::Queue);
    }

    #[tokio::test]
    async fn returns_none_when_nothing_available() {
        let mut state = SupervisorState::new(ExecutionMode::Auto);
        assert!(retrieve_next(&mut state, &queue()).await.unwrap().is_none());
    }
}
