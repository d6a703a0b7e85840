//! Health checking subsystem.
//!
//! # Data Flow
//! ```text
//! Periodic checks (active.rs):
//!     Interval timer
//!     → checker.rs runs every named check (e.g. "Redis" → store PING)
//!     → state.rs folds each result into its CheckState
//!
//! Health endpoint:
//!     GET /health
//!     → checker.rs report (aggregate status + per-check detail)
//!     → 200 OK / 429 WARNING / 500 CRITICAL
//! ```
//!
//! # Design Decisions
//! - Checks never gate traffic; they only feed the health endpoint
//! - A failing check degrades to WARNING before CRITICAL
//! - Monitoring stops before the listener during shutdown

pub mod active;
pub mod checker;
pub mod state;

pub use active::HealthMonitor;
pub use checker::{Checker, HealthChecker, HealthReport, StoreCheck, REDIS_CHECK};
pub use state::{CheckState, Status};
