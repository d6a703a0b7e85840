//! Redirect middleware.
//!
//! Looks the full request path and query up in the redirect store before
//! anything else sees the request. A stored target short-circuits with a
//! permanent redirect; everything else passes through. Store failures never
//! fail the request: they are logged and the request continues as a miss.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, HeaderValue, Request, StatusCode};
use axum::response::{IntoResponse, Response};
use tracing::{debug, error};

use super::{Handler, SharedHandler};
use crate::observability::metrics;
use crate::store::{RedirectStore, StoreError};

/// Wraps a handler with redirect lookups.
#[derive(Clone)]
pub struct RedirectLayer {
    store: Arc<dyn RedirectStore>,
    lookup_timeout: Duration,
}

impl RedirectLayer {
    pub fn new(store: Arc<dyn RedirectStore>, lookup_timeout: Duration) -> Self {
        Self {
            store,
            lookup_timeout,
        }
    }

    pub fn layer(&self, inner: SharedHandler) -> Redirect {
        Redirect {
            store: self.store.clone(),
            lookup_timeout: self.lookup_timeout,
            inner,
        }
    }
}

/// Handler answering stored redirects and delegating everything else.
pub struct Redirect {
    store: Arc<dyn RedirectStore>,
    lookup_timeout: Duration,
    inner: SharedHandler,
}

impl Redirect {
    async fn lookup(&self, key: &str) -> Result<Option<String>, StoreError> {
        tokio::time::timeout(self.lookup_timeout, self.store.get(key))
            .await
            .map_err(|_| StoreError::Timeout(self.lookup_timeout))?
    }
}

/// Key under which a request's redirect is stored.
pub fn redirect_key<B>(request: &Request<B>) -> &str {
    request
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/")
}

#[async_trait]
impl Handler for Redirect {
    async fn handle(&self, request: Request<Body>) -> Response {
        let key = redirect_key(&request).to_string();

        match self.lookup(&key).await {
            Ok(Some(target)) if !target.is_empty() => match HeaderValue::from_str(&target) {
                Ok(location) => {
                    debug!(key = %key, target = %target, "Redirect hit");
                    metrics::record_redirect_lookup("hit");
                    return (StatusCode::PERMANENT_REDIRECT, [(header::LOCATION, location)])
                        .into_response();
                }
                Err(e) => {
                    error!(key = %key, error = %e, "Stored redirect target is not a valid header value");
                    metrics::record_redirect_lookup("error");
                }
            },
            Ok(_) => {
                metrics::record_redirect_lookup("miss");
            }
            Err(e) => {
                error!(key = %key, error = %e, "Redirect lookup failed, passing request through");
                metrics::record_redirect_lookup("error");
            }
        }

        self.inner.handle(request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proxy::handler_fn;
    use crate::store::MemoryStore;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Counting(AtomicUsize);

    #[async_trait]
    impl Handler for Counting {
        async fn handle(&self, _request: Request<Body>) -> Response {
            self.0.fetch_add(1, Ordering::SeqCst);
            (StatusCode::OK, "Mock Target Response").into_response()
        }
    }

    struct SlowStore;

    #[async_trait]
    impl RedirectStore for SlowStore {
        async fn get(&self, _key: &str) -> Result<Option<String>, StoreError> {
            tokio::time::sleep(Duration::from_secs(10)).await;
            Ok(Some("http://never".into()))
        }

        async fn check(&self) -> Result<(), StoreError> {
            Ok(())
        }
    }

    fn request(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    fn setup(store: Arc<dyn RedirectStore>) -> (Redirect, Arc<Counting>) {
        let inner = Arc::new(Counting(AtomicUsize::new(0)));
        let redirect = RedirectLayer::new(store, Duration::from_millis(100)).layer(inner.clone());
        (redirect, inner)
    }

    #[tokio::test]
    async fn test_hit_returns_permanent_redirect() {
        let store = Arc::new(MemoryStore::with_entries([(
            "/old-url",
            "http://localhost:30000/new-url",
        )]));
        let (redirect, inner) = setup(store);

        let response = redirect.handle(request("/old-url")).await;
        assert_eq!(response.status(), StatusCode::PERMANENT_REDIRECT);
        assert_eq!(
            response.headers()[header::LOCATION],
            "http://localhost:30000/new-url"
        );
        assert_eq!(inner.0.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_key_includes_query() {
        let store = Arc::new(MemoryStore::with_entries([("/page?id=7", "/pages/7")]));
        let (redirect, inner) = setup(store);

        let response = redirect.handle(request("/page?id=7")).await;
        assert_eq!(response.status(), StatusCode::PERMANENT_REDIRECT);

        let response = redirect.handle(request("/page")).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(inner.0.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_miss_and_empty_value_pass_through() {
        let store = Arc::new(MemoryStore::with_entries([("/blank", "")]));
        let (redirect, inner) = setup(store);

        for uri in ["/non-redirect-url", "/blank"] {
            let response = redirect.handle(request(uri)).await;
            assert_eq!(response.status(), StatusCode::OK);
        }
        assert_eq!(inner.0.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_store_error_fails_open() {
        let store = Arc::new(MemoryStore::with_entries([("/old-url", "/new-url")]));
        store.set_failing(true);
        let (redirect, inner) = setup(store.clone());

        let response = redirect.handle(request("/old-url")).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(inner.0.load(Ordering::SeqCst), 1);
        assert_eq!(store.lookups(), 1);
    }

    #[tokio::test]
    async fn test_slow_store_times_out_and_fails_open() {
        let (redirect, inner) = setup(Arc::new(SlowStore));

        let started = std::time::Instant::now();
        let response = redirect.handle(request("/old-url")).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(inner.0.load(Ordering::SeqCst), 1);
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_inner_sees_unmodified_request() {
        let inner = handler_fn(|req: Request<Body>| async move {
            let body = axum::body::to_bytes(req.into_body(), usize::MAX).await.unwrap();
            (StatusCode::OK, body).into_response()
        });
        let redirect = RedirectLayer::new(Arc::new(MemoryStore::new()), Duration::from_millis(100))
            .layer(Arc::new(inner));

        let request = Request::builder()
            .method("POST")
            .uri("/submit")
            .body(Body::from("form=1"))
            .unwrap();
        let response = redirect.handle(request).await;
        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(body, "form=1");
    }
}
