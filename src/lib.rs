//! Redirect proxy library.
//!
//! An HTTP gateway in front of a primary content service: optional permanent
//! redirects from a key-value store, an optional releases path tried against
//! a secondary service before falling back to the primary, and byte-for-byte
//! forwarding of everything else.

pub mod config;
pub mod health;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod proxy;
pub mod routing;
pub mod store;

pub use config::schema::ProxyConfig;
pub use http::HttpServer;
pub use lifecycle::{Service, Shutdown};
