//! Property-based checks for the invariants the control loop depends
//! on: FIFO queue ordering, prompt-build purity, the completed-tasks
//! cap, and repeated-identical-failure detection.

use std::sync::Arc;

use proptest::prelude::*;
use supervisor::application::prompt_builder::{build_prompt, build_snapshot};
use supervisor::application::repository::TaskQueueRepository;
use supervisor::application::retry_policy::is_repeated_identical_failure;
use supervisor::domain::state::{ExecutionMode, SupervisorState};
use supervisor::domain::task::{CompletedTask, Task};
use supervisor::domain::validation::ValidationReport;
use supervisor::infrastructure::state_store::InMemoryStateStore;
use supervisor::ports::StateStore;

fn task_id_strategy() -> impl Strategy<Value = String> {
    "[a-z]{1,8}-[0-9]{1,4}"
}

proptest! {
    /// Whatever order tasks are enqueued in, they dequeue in that exact
    /// order — the queue never reorders or drops.
    #[test]
    fn queue_dequeues_in_enqueue_order(ids in prop::collection::vec(task_id_strategy(), 0..30)) {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        runtime.block_on(async {
            let store: Arc<dyn StateStore> = Arc::new(InMemoryStateStore::new());
            let queue = TaskQueueRepository::new(store, "queue:prop");
            for id in &ids {
                let task = Task::new(id.clone(), "do something", "claude").with_acceptance_criteria(vec!["x".into()]);
                queue.enqueue(&task).await.unwrap();
            }
            for expected in &ids {
                let dequeued = queue.dequeue().await.unwrap().unwrap();
                prop_assert_eq!(&dequeued.task_id, expected);
            }
            prop_assert!(queue.is_empty().await.unwrap());
            Ok(())
        }).unwrap();
    }

    /// `build_prompt` is a pure function of (task, snapshot): calling it
    /// twice on the same inputs always yields byte-identical output,
    /// across arbitrary intents, instructions, and acceptance criteria.
    #[test]
    fn build_prompt_is_deterministic(
        intent in "[a-zA-Z0-9 .,]{1,40}",
        instructions in "[a-zA-Z0-9 .,\n]{0,80}",
        criteria in prop::collection::vec("[a-zA-Z0-9 ]{1,20}", 0..5),
    ) {
        let task = Task::new("t-prop", intent, "claude")
            .with_instructions(instructions)
            .with_acceptance_criteria(criteria);
        let state = SupervisorState::new(ExecutionMode::Auto);
        let snapshot = build_snapshot(&task, &state, std::path::Path::new("/sandbox/proj"));

        let first = build_prompt(&task, &snapshot);
        let second = build_prompt(&task, &snapshot);
        prop_assert_eq!(first, second);
    }

    /// `completed_tasks` never exceeds its cap regardless of how many
    /// completions are pushed, and the newest entry is always retained.
    #[test]
    fn completed_tasks_never_exceeds_cap(push_count in 0usize..250) {
        let mut state = SupervisorState::new(ExecutionMode::Auto);
        for i in 0..push_count {
            state.push_completed(CompletedTask {
                task_id: format!("t-{i}"),
                completed_at: chrono::Utc::now(),
                intent: "x".into(),
                summary: "y".into(),
                requires_context: true,
                report: ValidationReport::trivial_pass(),
            });
        }
        prop_assert!(state.completed_tasks.len() <= 100);
        if push_count > 0 {
            prop_assert_eq!(state.completed_tasks.back().unwrap().task_id.clone(), format!("t-{}", push_count - 1));
        }
    }

    /// Repeated-identical-failure detection fires iff the most recent
    /// `threshold` reason keys are all equal to each other, matching a
    /// naive reference implementation over arbitrary histories.
    #[test]
    fn repeated_identical_failure_matches_reference(
        history in prop::collection::vec("[a-c]", 0..8),
        threshold in 1u32..5,
    ) {
        let detected = is_repeated_identical_failure(&history, threshold);

        let reference = {
            let t = threshold as usize;
            if history.len() < t {
                false
            } else {
                let tail = &history[history.len() - t..];
                tail.windows(2).all(|pair| pair[0] == pair[1])
            }
        };

        prop_assert_eq!(detected, reference);
    }

    /// A threshold of zero never reports a repeated failure, regardless
    /// of history contents.
    #[test]
    fn zero_threshold_never_detects_repetition(history in prop::collection::vec("[a-c]", 0..8)) {
        prop_assert!(!is_repeated_identical_failure(&history, 0));
    }
}
