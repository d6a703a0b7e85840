//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming Request (path only)
//!     → router.rs (ordered prefix lookup)
//!     → matcher.rs (segment-aware prefix test)
//!     → matched prefix handler, or the catch-all
//!
//! Route Compilation (per pipeline build):
//!     RouterBuilder::prefix(..)*
//!     → RouterBuilder::catch_all(..)
//!     → Sort by specificity, freeze as immutable Router
//! ```
//!
//! # Design Decisions
//! - Routes compiled when the pipeline is built, immutable at runtime
//! - No regex in hot path (prefix matching only)
//! - Deterministic: same path always matches same route
//! - Every path matches something; the catch-all is mandatory

pub mod matcher;
pub mod router;

pub use router::{Router, RouterBuilder};
