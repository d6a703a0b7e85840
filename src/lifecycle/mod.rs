//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs, service.rs):
//!     Validate config → Store client → Health checks → Pipeline → Listener
//!
//! Shutdown (shutdown.rs, service.rs):
//!     Signal received → Stop health monitor → Stop accepting → Drain → Exit
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Trigger graceful shutdown
//! ```
//!
//! # Design Decisions
//! - Ordered startup: config first, then dependencies, then the listener
//! - Ordered shutdown: health first, then the listener
//! - Shutdown has a deadline; exceeding it is reported, not hidden

pub mod service;
pub mod shutdown;
pub mod signals;
pub mod startup;

pub use service::{Service, ServiceState, StateCell, StopReason};
pub use shutdown::{Shutdown, ShutdownError};
pub use startup::{Initialiser, RedisInitialiser, StartupError, StaticInitialiser};
