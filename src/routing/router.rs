//! Route lookup and dispatch.
//!
//! # Responsibilities
//! - Store prefix routes ordered by specificity
//! - Look up the handler for a request path
//! - Dispatch the request to it
//!
//! # Design Decisions
//! - Immutable after construction (thread-safe without locks)
//! - Longest prefix wins; ties keep registration order
//! - The catch-all always exists and is always last: registering it consumes
//!   the builder, so nothing can be added behind it

use async_trait::async_trait;
use axum::body::Body;
use axum::http::Request;
use axum::response::Response;

use super::matcher::{Matcher, PathPrefixMatcher};
use crate::proxy::{Handler, SharedHandler};

#[derive(Clone)]
struct Route {
    matcher: PathPrefixMatcher,
    handler: SharedHandler,
}

/// Collects prefix routes until the catch-all is registered.
#[derive(Default)]
pub struct RouterBuilder {
    routes: Vec<Route>,
}

impl RouterBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Route paths at or below `prefix` to `handler`.
    pub fn prefix(mut self, prefix: impl Into<String>, handler: SharedHandler) -> Self {
        self.routes.push(Route {
            matcher: PathPrefixMatcher::new(prefix),
            handler,
        });
        self
    }

    /// Finish the router with the handler for everything else.
    pub fn catch_all(mut self, handler: SharedHandler) -> Router {
        // stable sort keeps registration order among equal prefixes
        self.routes
            .sort_by(|a, b| b.matcher.specificity().cmp(&a.matcher.specificity()));

        Router {
            routes: self.routes,
            fallback: handler,
        }
    }
}

/// Path-based dispatcher.
#[derive(Clone)]
pub struct Router {
    routes: Vec<Route>,
    fallback: SharedHandler,
}

impl std::fmt::Debug for Router {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Router")
            .field("prefixes", &self.prefixes())
            .finish_non_exhaustive()
    }
}

impl Router {
    pub fn builder() -> RouterBuilder {
        RouterBuilder::new()
    }

    /// Handler responsible for `path`.
    pub fn match_path(&self, path: &str) -> &SharedHandler {
        self.routes
            .iter()
            .find(|r| r.matcher.matches(path))
            .map(|r| &r.handler)
            .unwrap_or(&self.fallback)
    }

    /// Registered prefixes in match order.
    pub fn prefixes(&self) -> Vec<&str> {
        self.routes.iter().map(|r| r.matcher.prefix()).collect()
    }
}

#[async_trait]
impl Handler for Router {
    async fn handle(&self, request: Request<Body>) -> Response {
        let handler = self.match_path(request.uri().path()).clone();
        handler.handle(request).await
    }
}
