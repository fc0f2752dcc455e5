use async_trait::async_trait;

use crate::error::Result;

/// An abstract keyed store providing atomic get/set on a string key and
/// ordered push/pop on a list key. Two partitions are addressed through
/// it at the application layer: the state namespace (one key, the
/// supervisor state) and the queue namespace (one list, the task
/// queue) — this trait itself is agnostic to that split.
///
/// Implementations must not reorder or mutate list entries; `list_pop_front`
/// removes and returns exactly the bytes a prior `list_push_back` wrote.
#[async_trait]
pub trait StateStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;

    async fn set(&self, key: &str, value: String) -> Result<()>;

    async fn list_push_back(&self, key: &str, value: String) -> Result<()>;

    async fn list_pop_front(&self, key: &str) -> Result<Option<String>>;

    async fn list_len(&self, key: &str) -> Result<usize>;
}
