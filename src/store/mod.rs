//! Session store backends.
//!
//! The store keeps per-session conversation history under opaque string
//! keys. Consistency is delegated entirely to the backend; the client holds
//! no locks over stored data.

mod memory;
mod redis;

pub use memory::MemoryStore;
pub use redis::RedisStore;

use std::time::Duration;

use async_trait::async_trait;

use crate::error::Result;

/// Key-value store for session state.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Backend name (e.g. "redis", "memory").
    fn name(&self) -> &str;

    /// Establish the backend connection.
    ///
    /// Idempotent: calling again on a live store is a no-op and must not
    /// open a second connection.
    async fn connect(&self) -> Result<()>;

    /// Fetch the value stored under `key`, if any.
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Store `value` under `key` with the given time-to-live.
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<()>;

    /// Health check — true when the backend answers.
    async fn is_healthy(&self) -> bool;
}
