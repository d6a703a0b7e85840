//! Startup orchestration.
//!
//! # Responsibilities
//! - Validate configuration
//! - Obtain the redirect store client
//! - Wire health checks and build the request pipeline
//! - Bind the listener and begin accepting traffic
//!
//! # Design Decisions
//! - Fail fast: any startup error is returned before traffic is accepted
//! - Subsystems initialize in order, not concurrently
//! - The listener starts last (traffic only when ready)

use std::sync::Arc;

use thiserror::Error;

use crate::config::{ConfigError, RedisConfig};
use crate::proxy::BuildError;
use crate::store::{RedirectStore, RedisStore, StoreError};

/// Why the service failed to start.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("failed to create redirect store client: {0}")]
    Store(#[from] StoreError),

    #[error("failed to build request pipeline: {0}")]
    Pipeline(#[from] BuildError),

    #[error("failed to bind {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: std::io::Error,
    },
}

/// Supplies the external clients the service depends on.
pub trait Initialiser: Send + Sync {
    fn redirect_store(&self, config: &RedisConfig) -> Result<Arc<dyn RedirectStore>, StoreError>;
}

/// Production initialiser: a lazily connected Redis client.
#[derive(Debug, Default, Clone, Copy)]
pub struct RedisInitialiser;

impl Initialiser for RedisInitialiser {
    fn redirect_store(&self, config: &RedisConfig) -> Result<Arc<dyn RedirectStore>, StoreError> {
        Ok(Arc::new(RedisStore::new(config)?))
    }
}

/// Initialiser handing out a store built elsewhere.
#[derive(Clone)]
pub struct StaticInitialiser {
    store: Arc<dyn RedirectStore>,
}

impl StaticInitialiser {
    pub fn new(store: Arc<dyn RedirectStore>) -> Self {
        Self { store }
    }
}

impl Initialiser for StaticInitialiser {
    fn redirect_store(&self, _config: &RedisConfig) -> Result<Arc<dyn RedirectStore>, StoreError> {
        Ok(self.store.clone())
    }
}
