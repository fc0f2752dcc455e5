use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::Result;
use crate::ports::StateStore;

/// An in-process `StateStore` used by tests and by `supervisor start
/// --ephemeral`-style local runs. Mirrors the Redis adapter's semantics
/// exactly (atomic get/set on a string key, FIFO push/pop on a list
/// key) so the same application-layer code exercises both.
#[derive(Default)]
pub struct InMemoryStateStore {
    strings: Mutex<HashMap<String, String>>,
    lists: Mutex<HashMap<String, VecDeque<String>>>,
}

impl InMemoryStateStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StateStore for InMemoryStateStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.strings.lock().expect("state store mutex poisoned").get(key).cloned())
    }

    async fn set(&self, key: &str, value: String) -> Result<()> {
        self.strings.lock().expect("state store mutex poisoned").insert(key.to_string(), value);
        Ok(())
    }

    async fn list_push_back(&self, key: &str, value: String) -> Result<()> {
        self.lists
            .lock()
            .expect("state store mutex poisoned")
            .entry(key.to_string())
            .or_default()
            .push_back(value);
        Ok(())
    }

    async fn list_pop_front(&self, key: &str) -> Result<Option<String>> {
        Ok(self
            .lists
            .lock()
            .expect("state store mutex poisoned")
            .get_mut(key)
            .and_then(VecDeque::pop_front))
    }

    async fn list_len(&self, key: &str) -> Result<usize> {
        Ok(self.lists.lock().expect("state store mutex poisoned").get(key).map_or(0, VecDeque::len))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn round_trips_string_key() {
        let store = InMemoryStateStore::new();
        assert_eq!(store.get("k").await.unwrap(), None);
        store.set("k", "v".into()).await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), Some("v".into()));
    }

    #[tokio::test]
    async fn list_is_fifo() {
        let store = InMemoryStateStore::new();
        store.list_push_back("q", "a".into()).await.unwrap();
        store.list_push_back("q", "b".into()).await.unwrap();
        assert_eq!(store.list_len("q").await.unwrap(), 2);
        assert_eq!(store.list_pop_front("q").await.unwrap(), Some("a".into()));
        assert_eq!(store.list_pop_front("q").await.unwrap(), Some("b".into()));
        assert_eq!(store.list_pop_front("q").await.unwrap(), None);
    }
}
