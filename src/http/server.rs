//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create the Axum router: `/health` plus a fallback into the pipeline
//! - Wire up middleware (request ID, tracing)
//! - Serve on a bound listener until the shutdown signal fires
//!
//! # Design Decisions
//! - The pipeline is read through `ArcSwap` per request, so a reload never
//!   blocks or disturbs in-flight requests
//! - In-flight requests keep the pipeline they started with

use std::sync::Arc;

use arc_swap::ArcSwap;
use axum::{
    body::Body,
    extract::State,
    http::Request,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

use crate::health::HealthChecker;
use crate::http::request::{propagate_request_id_layer, request_id, set_request_id_layer};
use crate::lifecycle::Shutdown;
use crate::proxy::{Handler, Pipeline};

pub const HEALTH_PATH: &str = "/health";

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<ArcSwap<Pipeline>>,
    pub health: Arc<HealthChecker>,
}

/// HTTP front end of the proxy.
pub struct HttpServer {
    router: Router,
}

impl HttpServer {
    pub fn new(pipeline: Arc<ArcSwap<Pipeline>>, health: Arc<HealthChecker>) -> Self {
        let state = AppState { pipeline, health };
        Self {
            router: Self::build_router(state),
        }
    }

    /// Build the Axum router with all middleware layers.
    fn build_router(state: AppState) -> Router {
        Router::new()
            .route(HEALTH_PATH, get(health_handler))
            .fallback(proxy_handler)
            .with_state(state)
            .layer(TraceLayer::new_for_http().make_span_with(|request: &Request<Body>| {
                tracing::info_span!(
                    "request",
                    method = %request.method(),
                    uri = %request.uri(),
                    request_id = %request_id(request),
                )
            }))
            .layer(propagate_request_id_layer())
            .layer(set_request_id_layer())
    }

    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Run the server on `listener` until `shutdown` fires, then drain.
    pub async fn run(self, listener: TcpListener, shutdown: Shutdown) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        axum::serve(listener, self.router)
            .with_graceful_shutdown(async move { shutdown.wait().await })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

async fn proxy_handler(State(state): State<AppState>, request: Request<Body>) -> Response {
    let pipeline = state.pipeline.load_full();
    pipeline.handle(request).await
}

async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    let report = state.health.report();
    (report.status.http_status(), Json(report))
}
