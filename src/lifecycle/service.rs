//! The running proxy service.
//!
//! # States
//! ```text
//! Stopped → Starting → Running → Stopping → Stopped
//! ```
//!
//! # Data Flow
//! ```text
//! Service::run(config, initialiser, errors)
//!     → state: Starting (back to Stopped on any failure below)
//!     → validate config
//!     → initialiser: redirect store client
//!     → health checker + "Redis" check
//!     → build_pipeline (abort on error, listener never bound)
//!     → bind listener
//!     → spawn health monitor, spawn HTTP server
//!     → state: Running
//!
//! Service::close()
//!     → stop health monitor
//!     → stop accepting, drain in-flight requests
//!     (both within listener.graceful_shutdown_secs)
//! ```

use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use arc_swap::ArcSwap;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::shutdown::{Shutdown, ShutdownError};
use super::startup::{Initialiser, StartupError};
use crate::config::{validate_config, ConfigError, ProxyConfig};
use crate::health::{HealthChecker, HealthMonitor, StoreCheck, REDIS_CHECK};
use crate::http::HttpServer;
use crate::proxy::{build_pipeline, BuildError, Pipeline};
use crate::store::RedirectStore;

/// Lifecycle state of a [`Service`].
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceState {
    Stopped = 0,
    Starting = 1,
    Running = 2,
    Stopping = 3,
}

impl From<u8> for ServiceState {
    fn from(val: u8) -> Self {
        match val {
            1 => ServiceState::Starting,
            2 => ServiceState::Running,
            3 => ServiceState::Stopping,
            _ => ServiceState::Stopped,
        }
    }
}

/// Why [`Service::serve_until`] returned.
#[derive(Debug)]
pub enum StopReason {
    /// The stop future resolved, carrying the signal name.
    Signal(&'static str),
    /// The running server reported a fatal error.
    Failed(std::io::Error),
}

/// Shared view of a service's [`ServiceState`].
///
/// Clones observe the same service, so a caller can watch the state while
/// [`Service::start`] is still wiring components.
#[derive(Debug, Clone, Default)]
pub struct StateCell(Arc<AtomicU8>);

impl StateCell {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> ServiceState {
        ServiceState::from(self.0.load(Ordering::SeqCst))
    }

    fn set(&self, state: ServiceState) {
        self.0.store(state as u8, Ordering::SeqCst);
    }
}

/// A started proxy: listener, health monitor and the current pipeline.
pub struct Service {
    state: StateCell,
    local_addr: SocketAddr,
    config: Mutex<ProxyConfig>,
    store: Arc<dyn RedirectStore>,
    pipeline: Arc<ArcSwap<Pipeline>>,
    health: Arc<HealthChecker>,
    health_shutdown: Shutdown,
    server_shutdown: Shutdown,
    health_task: tokio::sync::Mutex<Option<JoinHandle<()>>>,
    server_task: tokio::sync::Mutex<Option<JoinHandle<Result<(), std::io::Error>>>>,
}

impl Service {
    /// Start the service.
    ///
    /// Fatal errors from the running HTTP server are sent on `errors`.
    pub async fn run(
        config: ProxyConfig,
        initialiser: &dyn Initialiser,
        errors: mpsc::UnboundedSender<std::io::Error>,
    ) -> Result<Self, StartupError> {
        Self::start(config, initialiser, errors, StateCell::new()).await
    }

    /// Start the service, reporting its lifecycle through `state`.
    pub async fn start(
        config: ProxyConfig,
        initialiser: &dyn Initialiser,
        errors: mpsc::UnboundedSender<std::io::Error>,
        state: StateCell,
    ) -> Result<Self, StartupError> {
        tracing::info!(version = env!("CARGO_PKG_VERSION"), "Service starting");
        state.set(ServiceState::Starting);

        match Self::wire(config, initialiser, errors, state.clone()).await {
            Ok(service) => {
                state.set(ServiceState::Running);
                Ok(service)
            }
            Err(e) => {
                state.set(ServiceState::Stopped);
                tracing::error!(error = %e, "Service failed to start");
                Err(e)
            }
        }
    }

    async fn wire(
        config: ProxyConfig,
        initialiser: &dyn Initialiser,
        errors: mpsc::UnboundedSender<std::io::Error>,
        state: StateCell,
    ) -> Result<Self, StartupError> {

        validate_config(&config).map_err(ConfigError::Validation)?;

        let store = initialiser.redirect_store(&config.redis)?;

        let health = Arc::new(HealthChecker::new(
            &config.health_check,
            env!("CARGO_PKG_VERSION"),
        ));
        health.add_check(REDIS_CHECK, Arc::new(StoreCheck::new(store.clone())));

        let pipeline = build_pipeline(&config, Some(store.clone()))?;
        let pipeline = Arc::new(ArcSwap::from_pointee(pipeline));

        let listener = TcpListener::bind(&config.listener.bind_address)
            .await
            .map_err(|source| StartupError::Bind {
                address: config.listener.bind_address.clone(),
                source,
            })?;
        let local_addr = listener.local_addr().map_err(|source| StartupError::Bind {
            address: config.listener.bind_address.clone(),
            source,
        })?;

        let health_shutdown = Shutdown::new();
        let monitor = HealthMonitor::new(health.clone());
        let health_task = tokio::spawn(monitor.run(health_shutdown.subscribe()));

        let server_shutdown = Shutdown::new();
        let server = HttpServer::new(pipeline.clone(), health.clone());
        let shutdown = server_shutdown.clone();
        let server_task = tokio::spawn(async move {
            let result = server.run(listener, shutdown).await;
            if let Err(e) = &result {
                tracing::error!(error = %e, "HTTP server failed");
                let _ = errors.send(std::io::Error::new(e.kind(), e.to_string()));
            }
            result
        });

        tracing::info!(
            address = %local_addr,
            redirects = config.features.enable_redirects,
            releases_fallback = config.features.enable_releases_fallback,
            "Service running"
        );

        Ok(Self {
            state,
            local_addr,
            config: Mutex::new(config),
            store,
            pipeline,
            health,
            health_shutdown,
            server_shutdown,
            health_task: tokio::sync::Mutex::new(Some(health_task)),
            server_task: tokio::sync::Mutex::new(Some(server_task)),
        })
    }

    pub fn state(&self) -> ServiceState {
        self.state.get()
    }

    /// Address the listener is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn health(&self) -> Arc<HealthChecker> {
        self.health.clone()
    }

    /// Rebuild the pipeline from `config` and swap it in.
    ///
    /// Listener, store and health settings only take effect on restart.
    pub fn reload(&self, config: ProxyConfig) -> Result<(), BuildError> {
        let pipeline = build_pipeline(&config, Some(self.store.clone()))?;
        self.pipeline.store(Arc::new(pipeline));

        if let Ok(mut current) = self.config.lock() {
            if current.listener != config.listener
                || current.redis != config.redis
                || current.health_check != config.health_check
            {
                tracing::warn!("Listener, redis or health check settings changed; restart to apply");
            }
            *current = config;
        }

        tracing::info!("Pipeline reloaded");
        Ok(())
    }

    /// Apply config reloads until `stop` resolves or the server fails.
    ///
    /// `stop` is polled across reloads, so a signal arriving while a reload
    /// is applied is not lost.
    pub async fn serve_until<F>(
        &self,
        stop: F,
        errors: &mut mpsc::UnboundedReceiver<std::io::Error>,
        mut reloads: Option<mpsc::UnboundedReceiver<ProxyConfig>>,
    ) -> std::io::Result<StopReason>
    where
        F: Future<Output = std::io::Result<&'static str>>,
    {
        tokio::pin!(stop);
        loop {
            tokio::select! {
                signal = &mut stop => return Ok(StopReason::Signal(signal?)),
                Some(err) = errors.recv() => return Ok(StopReason::Failed(err)),
                Some(config) = async {
                    match reloads.as_mut() {
                        Some(rx) => rx.recv().await,
                        None => std::future::pending().await,
                    }
                } => {
                    if let Err(e) = self.reload(config) {
                        tracing::error!(error = %e, "Failed to apply new config, keeping current pipeline");
                    }
                }
            }
        }
    }

    /// Stop health monitoring, then the HTTP server, within the graceful
    /// shutdown deadline.
    pub async fn close(&self) -> Result<(), ShutdownError> {
        let deadline = self
            .config
            .lock()
            .map(|c| Duration::from_secs(c.listener.graceful_shutdown_secs))
            .unwrap_or(Duration::from_secs(5));

        self.state.set(ServiceState::Stopping);
        tracing::info!(deadline = ?deadline, "Service stopping");

        let result = match tokio::time::timeout(deadline, self.stop_components()).await {
            Ok(result) => result,
            Err(_) => {
                self.abort_components().await;
                Err(ShutdownError::TimedOut(deadline))
            }
        };

        self.state.set(ServiceState::Stopped);
        match &result {
            Ok(()) => tracing::info!("Service stopped"),
            Err(e) => tracing::error!(error = %e, "Service did not stop cleanly"),
        }
        result
    }

    async fn stop_components(&self) -> Result<(), ShutdownError> {
        self.health_shutdown.trigger();
        let health = {
            let mut slot = self.health_task.lock().await;
            match slot.as_mut() {
                Some(handle) => {
                    let joined = handle.await;
                    *slot = None;
                    joined.map_err(|e| ShutdownError::Failed {
                        component: "health monitor",
                        reason: e.to_string(),
                    })
                }
                None => Ok(()),
            }
        };

        // the listener is stopped even when the monitor failed
        self.server_shutdown.trigger();
        let server = {
            let mut slot = self.server_task.lock().await;
            match slot.as_mut() {
                Some(handle) => {
                    let joined = handle.await;
                    *slot = None;
                    let reason = match joined {
                        Ok(Ok(())) => None,
                        Ok(Err(e)) => Some(e.to_string()),
                        Err(e) => Some(e.to_string()),
                    };
                    match reason {
                        Some(reason) => Err(ShutdownError::Failed {
                            component: "http server",
                            reason,
                        }),
                        None => Ok(()),
                    }
                }
                None => Ok(()),
            }
        };

        health.and(server)
    }

    async fn abort_components(&self) {
        if let Some(handle) = self.health_task.lock().await.take() {
            handle.abort();
        }
        if let Some(handle) = self.server_task.lock().await.take() {
            handle.abort();
        }
    }
}
