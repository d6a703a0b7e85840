//! Shared utilities for integration testing.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::body::Body;
use axum::extract::State;
use axum::http::{Request, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Router;
use bytes::Bytes;
use tokio::net::TcpListener;
use tokio::sync::mpsc;

use redirect_proxy::config::ProxyConfig;
use redirect_proxy::lifecycle::{Service, StaticInitialiser};
use redirect_proxy::store::{MemoryStore, RedirectStore};

/// Order in which mock upstreams were called, by name.
pub type CallLog = Arc<Mutex<Vec<&'static str>>>;

/// Decides the status and body for a request path.
pub type Responder = fn(&str) -> (StatusCode, &'static str);

#[derive(Clone)]
struct MockState {
    name: &'static str,
    responder: Responder,
    delay: Duration,
    hits: Arc<AtomicUsize>,
    bodies: Arc<Mutex<Vec<Bytes>>>,
    log: CallLog,
}

/// A mock upstream listening on an ephemeral port.
pub struct MockUpstream {
    pub addr: SocketAddr,
    pub url: String,
    hits: Arc<AtomicUsize>,
    bodies: Arc<Mutex<Vec<Bytes>>>,
}

impl MockUpstream {
    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }

    pub fn bodies(&self) -> Vec<Bytes> {
        self.bodies.lock().unwrap().clone()
    }
}

async fn mock_handler(State(state): State<MockState>, request: Request<Body>) -> Response {
    state.hits.fetch_add(1, Ordering::SeqCst);
    state.log.lock().unwrap().push(state.name);

    let path = request.uri().path().to_string();
    let body = axum::body::to_bytes(request.into_body(), usize::MAX)
        .await
        .unwrap_or_default();
    state.bodies.lock().unwrap().push(body);

    if !state.delay.is_zero() {
        tokio::time::sleep(state.delay).await;
    }

    let (status, body) = (state.responder)(&path);
    (status, [("mock-header", "test")], body).into_response()
}

/// Start a mock upstream answering every request through `responder`.
pub async fn start_mock_upstream(name: &'static str, responder: Responder, log: CallLog) -> MockUpstream {
    start_slow_upstream(name, responder, Duration::ZERO, log).await
}

/// Start a mock upstream that waits `delay` before answering.
pub async fn start_slow_upstream(
    name: &'static str,
    responder: Responder,
    delay: Duration,
    log: CallLog,
) -> MockUpstream {
    let hits = Arc::new(AtomicUsize::new(0));
    let bodies = Arc::new(Mutex::new(Vec::new()));
    let state = MockState {
        name,
        responder,
        delay,
        hits: hits.clone(),
        bodies: bodies.clone(),
        log,
    };

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = Router::new().fallback(mock_handler).with_state(state);
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    MockUpstream {
        addr,
        url: format!("http://{addr}"),
        hits,
        bodies,
    }
}

/// An address nothing listens on.
pub async fn closed_port_url() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{addr}")
}

/// Config pointing at the given upstreams, bound to an ephemeral port.
pub fn test_config(primary: &str, secondary: &str) -> ProxyConfig {
    let mut config = ProxyConfig::default();
    config.listener.bind_address = "127.0.0.1:0".to_string();
    config.listener.graceful_shutdown_secs = 2;
    config.upstreams.primary_url = primary.to_string();
    config.upstreams.secondary_url = secondary.to_string();
    config.health_check.interval_secs = 1;
    config.timeouts.connect_secs = 1;
    config.timeouts.request_secs = 2;
    config
}

/// A running proxy and the pieces tests inspect.
pub struct TestProxy {
    pub service: Service,
    pub base: String,
    pub errors: mpsc::UnboundedReceiver<std::io::Error>,
}

pub async fn start_proxy(config: ProxyConfig, store: Arc<MemoryStore>) -> TestProxy {
    let (errors_tx, errors) = mpsc::unbounded_channel();
    let store: Arc<dyn RedirectStore> = store;
    let service = Service::run(config, &StaticInitialiser::new(store), errors_tx)
        .await
        .expect("proxy should start");
    let base = format!("http://{}", service.local_addr());
    TestProxy {
        service,
        base,
        errors,
    }
}

/// HTTP client that never follows redirects and ignores proxy env vars.
pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .no_proxy()
        .build()
        .unwrap()
}

pub fn new_log() -> CallLog {
    Arc::new(Mutex::new(Vec::new()))
}

pub fn ok_target(_path: &str) -> (StatusCode, &'static str) {
    (StatusCode::OK, "Mock Target Response")
}

pub fn ok_proxied(_path: &str) -> (StatusCode, &'static str) {
    (StatusCode::OK, "Mock Proxied Server Response")
}

pub fn wagtail(path: &str) -> (StatusCode, &'static str) {
    if path.starts_with("/releases/known") {
        (StatusCode::OK, "Wagtail Response")
    } else {
        (StatusCode::NOT_FOUND, "Not Found")
    }
}
