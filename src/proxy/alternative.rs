//! Try-then combinator.
//!
//! # Responsibilities
//! - Run a "try" handler against a copy of the request and capture its response
//! - Replay the captured response unless its status is the trigger
//! - On the trigger status, run "then" against a second copy, streaming its
//!   response straight to the caller
//!
//! # Design Decisions
//! - Explicit two-phase protocol: capture into a plain record, decide, then
//!   replay or delegate
//! - "try" (including its full capture) finishes before "then" starts
//! - The inbound body is either buffered once up front or shared through a
//!   [`ReadSplitter`], per [`BodyReplay`]

use std::io;
use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{request::Parts, HeaderMap, Request, StatusCode};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use futures_util::TryStreamExt;
use tokio_util::io::{ReaderStream, StreamReader};
use tracing::{debug, error, warn};

use super::split::ReadSplitter;
use super::{Handler, SharedHandler};
use crate::config::BodyReplay;
use crate::observability::metrics;

const DEFAULT_MAX_BYTES: usize = 10 * 1024 * 1024;

/// A handler's response held entirely in memory.
#[derive(Debug, Clone)]
pub struct CapturedResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl CapturedResponse {
    /// Collect `response` into memory, failing if the body errors or exceeds
    /// `limit` bytes.
    pub async fn capture(response: Response, limit: usize) -> Result<Self, axum::Error> {
        let (parts, body) = response.into_parts();
        let body = axum::body::to_bytes(body, limit).await?;
        Ok(Self {
            status: parts.status,
            headers: parts.headers,
            body,
        })
    }

    /// Replay the captured status, headers and body verbatim.
    pub fn into_response(self) -> Response {
        let mut response = Response::new(Body::from(self.body));
        *response.status_mut() = self.status;
        *response.headers_mut() = self.headers;
        response
    }
}

/// Outcome of the capture phase.
#[derive(Debug)]
pub enum Decision {
    /// The try response stands; send it to the caller.
    Replay(CapturedResponse),
    /// The try response carried the trigger; hand the request to "then".
    Delegate,
}

impl Decision {
    pub fn decide(captured: CapturedResponse, trigger: StatusCode) -> Self {
        if captured.status == trigger {
            Decision::Delegate
        } else {
            Decision::Replay(captured)
        }
    }
}

/// Start building a combinator from its "try" handler.
pub fn try_handler(handler: SharedHandler) -> Try {
    Try { handler }
}

pub struct Try {
    handler: SharedHandler,
}

impl Try {
    pub fn when_status(self, status: StatusCode) -> When {
        When {
            try_handler: self.handler,
            trigger: status,
        }
    }
}

pub struct When {
    try_handler: SharedHandler,
    trigger: StatusCode,
}

impl When {
    pub fn then(self, handler: SharedHandler) -> Alternative {
        Alternative {
            try_handler: self.try_handler,
            trigger: self.trigger,
            then_handler: handler,
            body_replay: BodyReplay::Buffered,
            max_body_bytes: DEFAULT_MAX_BYTES,
            max_capture_bytes: DEFAULT_MAX_BYTES,
        }
    }
}

/// Try one handler; fall back to another when it answers with the trigger
/// status.
pub struct Alternative {
    try_handler: SharedHandler,
    trigger: StatusCode,
    then_handler: SharedHandler,
    body_replay: BodyReplay,
    max_body_bytes: usize,
    max_capture_bytes: usize,
}

impl Alternative {
    /// Same as the free [`try_handler`].
    pub fn try_handler(handler: SharedHandler) -> Try {
        try_handler(handler)
    }

    /// Chain a further fallback behind this combinator.
    pub fn when_status(self, status: StatusCode) -> When {
        try_handler(Arc::new(self)).when_status(status)
    }

    pub fn with_body_replay(mut self, body_replay: BodyReplay) -> Self {
        self.body_replay = body_replay;
        self
    }

    /// Bound the buffered inbound body and the captured try response.
    pub fn with_limits(mut self, max_body_bytes: usize, max_capture_bytes: usize) -> Self {
        self.max_body_bytes = max_body_bytes;
        self.max_capture_bytes = max_capture_bytes;
        self
    }

    pub fn trigger(&self) -> StatusCode {
        self.trigger
    }

    /// Produce the two bodies handed to "try" and "then".
    async fn replay_bodies(&self, body: Body) -> Result<(Body, Body), BodyError> {
        match self.body_replay {
            BodyReplay::Buffered => {
                let bytes = axum::body::to_bytes(body, self.max_body_bytes)
                    .await
                    .map_err(BodyError::Read)?;
                Ok((Body::from(bytes.clone()), Body::from(bytes)))
            }
            BodyReplay::Split => {
                let origin = StreamReader::new(body.into_data_stream().map_err(io::Error::other));
                let splitter = ReadSplitter::new(origin);
                // both readers must exist before the first pull
                let first = splitter.new_reader().map_err(BodyError::Split)?;
                let second = splitter.new_reader().map_err(BodyError::Split)?;
                Ok((
                    Body::from_stream(ReaderStream::new(first)),
                    Body::from_stream(ReaderStream::new(second)),
                ))
            }
        }
    }
}

#[derive(Debug, thiserror::Error)]
enum BodyError {
    #[error("failed to read request body: {0}")]
    Read(axum::Error),
    #[error("failed to split request body: {0}")]
    Split(io::Error),
}

/// Rebuild a request from its head with a fresh body.
fn rebuild(parts: &Parts, body: Body) -> Request<Body> {
    let mut request = Request::new(body);
    *request.method_mut() = parts.method.clone();
    *request.uri_mut() = parts.uri.clone();
    *request.version_mut() = parts.version;
    *request.headers_mut() = parts.headers.clone();
    request
}

#[async_trait]
impl Handler for Alternative {
    async fn handle(&self, request: Request<Body>) -> Response {
        let (parts, body) = request.into_parts();

        let (try_body, then_body) = match self.replay_bodies(body).await {
            Ok(bodies) => bodies,
            Err(e) => {
                error!(path = %parts.uri.path(), error = %e, "Cannot prepare request body for fallback");
                return (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error").into_response();
            }
        };

        let response = self.try_handler.handle(rebuild(&parts, try_body)).await;
        let captured = match CapturedResponse::capture(response, self.max_capture_bytes).await {
            Ok(captured) => captured,
            Err(e) => {
                warn!(path = %parts.uri.path(), error = %e, "Failed to capture try response");
                return (StatusCode::BAD_GATEWAY, "Bad Gateway").into_response();
            }
        };

        match Decision::decide(captured, self.trigger) {
            Decision::Replay(captured) => {
                debug!(path = %parts.uri.path(), status = %captured.status, "Replaying try response");
                metrics::record_fallback("replayed");
                captured.into_response()
            }
            Decision::Delegate => {
                debug!(path = %parts.uri.path(), trigger = %self.trigger, "Try response matched trigger, delegating");
                metrics::record_fallback("delegated");
                self.then_handler.handle(rebuild(&parts, then_body)).await
            }
        }
    }
}
