//! Redirect store subsystem.
//!
//! # Data Flow
//! ```text
//! Redirect middleware
//!     → RedirectStore::get(request URL)
//!         → redis.rs (single node or cluster)
//!         → memory.rs (in-process, local runs and tests)
//!     → Ok(Some(target)) | Ok(None) | Err(StoreError)
//!
//! Health checker
//!     → RedirectStore::check() (PING)
//! ```
//!
//! # Design Decisions
//! - "Not found" is `Ok(None)`, never an error
//! - The proxy only ever reads; entries are owned by whoever writes the store
//! - Implementations are shared across requests behind `Arc`

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

pub mod memory;
pub mod redis;

pub use self::memory::MemoryStore;
pub use self::redis::RedisStore;

/// Errors returned by redirect store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The Redis client reported an error.
    #[error("redis error: {0}")]
    Redis(#[from] ::redis::RedisError),

    /// The operation did not finish within its deadline.
    #[error("store operation timed out after {0:?}")]
    Timeout(Duration),

    /// Connection parameters could not be turned into a client.
    #[error("invalid store configuration: {0}")]
    InvalidConfig(String),

    /// The store cannot currently serve requests.
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Read-only access to the redirect table.
#[async_trait]
pub trait RedirectStore: Send + Sync {
    /// Look up the redirect target stored under `key`.
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Probe the store for the health checker.
    async fn check(&self) -> Result<(), StoreError>;
}
