//! Reverse forwarder to a single upstream.
//!
//! # Responsibilities
//! - Rewrite the inbound URI onto the upstream base URL
//! - Send the request with the inbound method, headers and body
//! - Relay the upstream status, headers and body without buffering
//!
//! # Design Decisions
//! - The client never follows redirects; a 3xx from upstream is relayed as-is
//! - The inbound `Host` header is preserved; when absent, the upstream
//!   authority is used
//! - Failures map to status codes: 400 (request cannot be built),
//!   502 (upstream unreachable), 504 (upstream too slow)

use std::time::{Duration, Instant};

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, HeaderValue, Request, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use hyper_util::client::legacy::{connect::HttpConnector, Client};
use hyper_util::rt::TokioExecutor;
use url::Url;

use super::Handler;
use crate::config::{validation::check_upstream_url, TimeoutConfig, ValidationError};
use crate::observability::metrics;

/// Why a request could not be forwarded.
#[derive(Debug, thiserror::Error)]
pub enum ForwardError {
    #[error("cannot build upstream request: {0}")]
    Request(String),

    #[error("upstream request failed: {0}")]
    Upstream(#[from] hyper_util::client::legacy::Error),

    #[error("upstream did not respond within {0:?}")]
    Timeout(Duration),
}

impl ForwardError {
    pub fn status(&self) -> StatusCode {
        match self {
            ForwardError::Request(_) => StatusCode::BAD_REQUEST,
            ForwardError::Upstream(_) => StatusCode::BAD_GATEWAY,
            ForwardError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
        }
    }
}

/// Forwards every request to one upstream base URL.
#[derive(Clone)]
pub struct Forwarder {
    /// Label used in logs and metrics.
    name: String,
    /// Base URL with any trailing `/` removed.
    base: String,
    client: Client<HttpConnector, Body>,
    request_timeout: Duration,
}

impl std::fmt::Debug for Forwarder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Forwarder")
            .field("name", &self.name)
            .field("base", &self.base)
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}

impl Forwarder {
    pub fn new(
        name: impl Into<String>,
        base_url: &str,
        timeouts: &TimeoutConfig,
    ) -> Result<Self, ValidationError> {
        let name = name.into();
        let url: Url = check_upstream_url("upstream", base_url)?;

        let mut connector = HttpConnector::new();
        connector.set_connect_timeout(Some(Duration::from_secs(timeouts.connect_secs)));
        let client = Client::builder(TokioExecutor::new()).build(connector);

        Ok(Self {
            name,
            base: url.as_str().trim_end_matches('/').to_string(),
            client,
            request_timeout: Duration::from_secs(timeouts.request_secs),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn base(&self) -> &str {
        &self.base
    }

    /// Upstream URI for an inbound URI: base followed by the inbound path
    /// and query.
    pub fn target_uri(&self, inbound: &Uri) -> Result<Uri, ForwardError> {
        let path_and_query = inbound
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or("/");
        format!("{}{}", self.base, path_and_query)
            .parse::<Uri>()
            .map_err(|e| ForwardError::Request(e.to_string()))
    }

    /// Forward a request and return the upstream response head with a
    /// streaming body.
    pub async fn forward(&self, request: Request<Body>) -> Result<Response, ForwardError> {
        let (parts, body) = request.into_parts();
        let uri = self.target_uri(&parts.uri)?;

        let mut builder = Request::builder().method(parts.method).uri(&uri);
        if let Some(headers) = builder.headers_mut() {
            *headers = parts.headers;
            if !headers.contains_key(header::HOST) {
                if let Some(authority) = uri.authority() {
                    let host = HeaderValue::from_str(authority.as_str())
                        .map_err(|e| ForwardError::Request(e.to_string()))?;
                    headers.insert(header::HOST, host);
                }
            }
        }
        let outbound = builder
            .body(body)
            .map_err(|e| ForwardError::Request(e.to_string()))?;

        let response = tokio::time::timeout(self.request_timeout, self.client.request(outbound))
            .await
            .map_err(|_| ForwardError::Timeout(self.request_timeout))??;

        let name = self.name.clone();
        let (parts, body) = response.into_parts();
        let body = http_body_util::BodyExt::map_err(body, move |e| {
            tracing::warn!(upstream = %name, error = %e, "Upstream body error");
            e
        });
        Ok(Response::from_parts(parts, Body::new(body)))
    }
}

#[async_trait]
impl Handler for Forwarder {
    async fn handle(&self, request: Request<Body>) -> Response {
        let start = Instant::now();
        let method = request.method().to_string();
        let path = request.uri().path().to_string();

        tracing::debug!(upstream = %self.name, method = %method, path = %path, "Forwarding request");

        match self.forward(request).await {
            Ok(response) => {
                metrics::record_request(&method, response.status().as_u16(), &self.name, start);
                response
            }
            Err(e) => {
                let status = e.status();
                tracing::error!(
                    upstream = %self.name,
                    method = %method,
                    path = %path,
                    error = %e,
                    "Upstream error"
                );
                metrics::record_request(&method, status.as_u16(), &self.name, start);
                (status, status.canonical_reason().unwrap_or_default()).into_response()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::routing::any;
    use axum::Router;
    use tokio::net::TcpListener;

    async fn spawn_upstream(router: Router) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{addr}")
    }

    fn timeouts() -> TimeoutConfig {
        TimeoutConfig {
            connect_secs: 1,
            request_secs: 1,
        }
    }

    #[test]
    fn test_target_uri_joins_base_and_path() {
        let fwd = Forwarder::new("primary", "http://localhost:20000/", &timeouts()).unwrap();
        assert_eq!(fwd.base(), "http://localhost:20000");

        let uri: Uri = "/a/b?c=d".parse().unwrap();
        assert_eq!(
            fwd.target_uri(&uri).unwrap().to_string(),
            "http://localhost:20000/a/b?c=d"
        );

        let uri: Uri = "http://proxy.local/x".parse().unwrap();
        assert_eq!(
            fwd.target_uri(&uri).unwrap().to_string(),
            "http://localhost:20000/x"
        );
    }

    #[test]
    fn test_rejects_bad_base() {
        assert!(Forwarder::new("primary", "not a url", &timeouts()).is_err());
        assert!(Forwarder::new("primary", "ftp://host", &timeouts()).is_err());
    }

    #[tokio::test]
    async fn test_relays_status_headers_and_body() {
        let upstream = spawn_upstream(Router::new().route(
            "/{*path}",
            any(|req: Request<Body>| async move {
                let host = req.headers()[header::HOST].to_str().unwrap().to_string();
                let method = req.method().to_string();
                let body = axum::body::to_bytes(req.into_body(), usize::MAX).await.unwrap();
                (
                    StatusCode::CREATED,
                    [("mock-header", "test"), ("x-seen-host", host.as_str())],
                    format!("{method} {}", String::from_utf8_lossy(&body)),
                )
                    .into_response()
            }),
        ))
        .await;

        let fwd = Forwarder::new("primary", &upstream, &timeouts()).unwrap();
        let request = Request::builder()
            .method("PUT")
            .uri("/items/1")
            .header(header::HOST, "proxy.example")
            .body(Body::from("hello"))
            .unwrap();

        let response = fwd.handle(request).await;
        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(response.headers()["mock-header"], "test");
        assert_eq!(response.headers()["x-seen-host"], "proxy.example");
        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(body, "PUT hello");
    }

    #[tokio::test]
    async fn test_does_not_follow_redirects() {
        let upstream = spawn_upstream(Router::new().route(
            "/{*path}",
            any(|| async {
                (StatusCode::FOUND, [(header::LOCATION, "/elsewhere")]).into_response()
            }),
        ))
        .await;

        let fwd = Forwarder::new("primary", &upstream, &timeouts()).unwrap();
        let response = fwd
            .handle(Request::builder().uri("/start").body(Body::empty()).unwrap())
            .await;
        assert_eq!(response.status(), StatusCode::FOUND);
        assert_eq!(response.headers()[header::LOCATION], "/elsewhere");
    }

    #[tokio::test]
    async fn test_unreachable_upstream_is_bad_gateway() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let fwd = Forwarder::new("primary", &format!("http://{addr}"), &timeouts()).unwrap();
        let response = fwd
            .handle(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await;
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    }

    #[tokio::test]
    async fn test_slow_upstream_is_gateway_timeout() {
        let upstream = spawn_upstream(Router::new().route(
            "/{*path}",
            any(|| async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                "late"
            }),
        ))
        .await;

        let fwd = Forwarder::new("primary", &upstream, &timeouts()).unwrap();
        let response = fwd
            .handle(Request::builder().uri("/slow").body(Body::empty()).unwrap())
            .await;
        assert_eq!(response.status(), StatusCode::GATEWAY_TIMEOUT);
    }
}
