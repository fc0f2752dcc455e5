use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;

use crate::config::StateStoreConfig;
use crate::error::{Result, SupervisorError};
use crate::ports::StateStore;

/// The production `StateStore`, addressed exactly as the environment
/// variables in the external-interfaces contract describe: host, port,
/// and db index select the connection; `state_key`/`queue_key` select
/// the string and list partitions within it.
pub struct RedisStateStore {
    manager: ConnectionManager,
}

impl RedisStateStore {
    pub async fn connect(config: &StateStoreConfig) -> Result<Self> {
        let url = format!("redis://{}:{}/{}", config.host, config.port, config.db);
        let client = redis::Client::open(url).map_err(|e| SupervisorError::StateStore(e.to_string()))?;
        let manager = client
            .get_connection_manager()
            .await
            .map_err(|e| SupervisorError::StateStore(e.to_string()))?;
        Ok(Self { manager })
    }
}

#[async_trait]
impl StateStore for RedisStateStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.manager.clone();
        conn.get(key).await.map_err(|e| SupervisorError::StateStore(e.to_string()))
    }

    async fn set(&self, key: &str, value: String) -> Result<()> {
        let mut conn = self.manager.clone();
        conn.set(key, value).await.map_err(|e| SupervisorError::StateStore(e.to_string()))
    }

    async fn list_push_back(&self, key: &str, value: String) -> Result<()> {
        let mut conn = self.manager.clone();
        let _: i64 = conn.rpush(key, value).await.map_err(|e| SupervisorError::StateStore(e.to_string()))?;
        Ok(())
    }

    async fn list_pop_front(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.manager.clone();
        conn.lpop(key, None).await.map_err(|e| SupervisorError::StateStore(e.to_string()))
    }

    async fn list_len(&self, key: &str) -> Result<usize> {
        let mut conn = self.manager.clone();
        let len: i64 = conn.llen(key).await.map_err(|e| SupervisorError::StateStore(e.to_string()))?;
        Ok(len.max(0) as usize)
    }
}
