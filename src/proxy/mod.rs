//! Request pipeline subsystem.
//!
//! # Data Flow
//! ```text
//! Inbound request
//!     → redirect.rs (optional: 308 on store hit, fail-open otherwise)
//!     → routing::Router (longest prefix, catch-all last)
//!         → alternative.rs (releases: try secondary, then primary on 404)
//!               ↳ split.rs (optional lazy body sharing between try and then)
//!         → forward.rs (catch-all: primary)
//!     → Response relayed to caller
//! ```
//!
//! # Design Decisions
//! - Every stage is a [`Handler`] so stages compose by wrapping
//! - Handlers always produce a response; failures become status codes
//! - The whole pipeline is built from config once and swapped as a unit

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::Request;
use axum::response::Response;

pub mod alternative;
pub mod forward;
pub mod pipeline;
pub mod redirect;
pub mod split;

pub use alternative::{try_handler, Alternative, CapturedResponse, Decision};
pub use forward::Forwarder;
pub use pipeline::{build_pipeline, BuildError, Pipeline};
pub use redirect::RedirectLayer;
pub use split::{ReadSplitter, SplitReader};

/// One stage of the request pipeline.
#[async_trait]
pub trait Handler: Send + Sync {
    async fn handle(&self, request: Request<Body>) -> Response;
}

/// Handlers are shared between the router, combinators and in-flight requests.
pub type SharedHandler = Arc<dyn Handler>;

/// Adapter turning an async closure into a [`Handler`].
pub struct HandlerFn<F>(F);

pub fn handler_fn<F, Fut>(f: F) -> HandlerFn<F>
where
    F: Fn(Request<Body>) -> Fut + Send + Sync,
    Fut: Future<Output = Response> + Send,
{
    HandlerFn(f)
}

#[async_trait]
impl<F, Fut> Handler for HandlerFn<F>
where
    F: Fn(Request<Body>) -> Fut + Send + Sync,
    Fut: Future<Output = Response> + Send,
{
    async fn handle(&self, request: Request<Body>) -> Response {
        (self.0)(request).await
    }
}
