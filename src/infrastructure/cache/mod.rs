//! Cache infrastructure - Store implementations

mod factory;
mod in_memory;
mod redis;

pub use factory::{CacheStoreFactory, StoreConfig, StoreType};
pub use in_memory::{InMemoryStore, InMemoryStoreConfig};
pub use redis::{escape_glob, RedisStore, RedisStoreConfig};
