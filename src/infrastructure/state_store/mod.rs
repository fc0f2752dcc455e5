pub mod memory_store;
pub mod redis_store;

pub use memory_store::InMemoryStateStore;
pub use redis_store::RedisStateStore;
