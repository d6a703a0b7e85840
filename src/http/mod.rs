//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, tracing)
//!     → request.rs (add or keep request ID)
//!     → /health → health checker report
//!     → anything else → current proxy::Pipeline
//!     → Send to client
//! ```

pub mod request;
pub mod server;

pub use request::{MakeRequestUuid, X_REQUEST_ID};
pub use server::{AppState, HttpServer, HEALTH_PATH};
