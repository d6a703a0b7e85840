//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML), optional
//!     → loader.rs (parse & deserialize, environment overrides)
//!     → validation.rs (semantic checks)
//!     → ProxyConfig (validated, immutable)
//!     → passed by value into Service::run and build_pipeline
//!
//! On file change:
//!     watcher.rs detects change
//!     → loader.rs loads new config
//!     → validation.rs validates
//!     → new pipeline built and swapped in atomically
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; changes produce a new value
//! - No process-wide config singleton
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use loader::{load_config, ConfigError};
pub use schema::{
    BodyReplay, FallbackConfig, FeatureConfig, HealthCheckConfig, ListenerConfig, LogFormat,
    ObservabilityConfig, ProxyConfig, RedisConfig, TimeoutConfig, UpstreamConfig,
};
pub use validation::{validate_config, ValidationError};
