//! Named health checks and their aggregate report.

use std::sync::{Arc, Mutex, RwLock};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures_util::future::join_all;
use serde::Serialize;

use super::state::{aggregate, unix_millis, CheckState, Status};
use crate::config::HealthCheckConfig;
use crate::observability::metrics;
use crate::store::RedirectStore;

/// Name under which the redirect store probe is registered.
pub const REDIS_CHECK: &str = "Redis";

/// A single dependency probe.
#[async_trait]
pub trait Checker: Send + Sync {
    /// `Err` carries a human-readable failure message.
    async fn check(&self) -> Result<(), String>;
}

/// Probes the redirect store.
pub struct StoreCheck {
    store: Arc<dyn RedirectStore>,
}

impl StoreCheck {
    pub fn new(store: Arc<dyn RedirectStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Checker for StoreCheck {
    async fn check(&self) -> Result<(), String> {
        self.store.check().await.map_err(|e| e.to_string())
    }
}

struct RegisteredCheck {
    name: String,
    checker: Arc<dyn Checker>,
    state: Mutex<Option<CheckState>>,
}

/// Runs registered checks and reports the combined status.
pub struct HealthChecker {
    checks: RwLock<Vec<Arc<RegisteredCheck>>>,
    version: String,
    started: Instant,
    interval: Duration,
    critical_timeout: Duration,
}

/// JSON body of the health endpoint.
#[derive(Debug, Serialize)]
pub struct HealthReport {
    pub status: Status,
    pub version: String,
    pub uptime_ms: u64,
    pub checks: Vec<CheckReport>,
}

#[derive(Debug, Serialize)]
pub struct CheckReport {
    pub name: String,
    pub status: Option<Status>,
    pub message: Option<String>,
    pub last_checked: Option<u64>,
    pub last_success: Option<u64>,
    pub last_failure: Option<u64>,
}

impl HealthChecker {
    pub fn new(config: &HealthCheckConfig, version: impl Into<String>) -> Self {
        Self {
            checks: RwLock::new(Vec::new()),
            version: version.into(),
            started: Instant::now(),
            interval: Duration::from_secs(config.interval_secs),
            critical_timeout: Duration::from_secs(config.critical_timeout_secs),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Register a named check. A name registered twice replaces the earlier check.
    pub fn add_check(&self, name: impl Into<String>, checker: Arc<dyn Checker>) {
        let name = name.into();
        if let Ok(mut checks) = self.checks.write() {
            checks.retain(|c| c.name != name);
            checks.push(Arc::new(RegisteredCheck {
                name,
                checker,
                state: Mutex::new(None),
            }));
        }
    }

    fn snapshot(&self) -> Vec<Arc<RegisteredCheck>> {
        self.checks.read().map(|c| c.clone()).unwrap_or_default()
    }

    /// Run every check once, concurrently, and record the results.
    ///
    /// A check still running after one interval is recorded as failed.
    pub async fn run_checks(&self) {
        let checks = self.snapshot();
        let deadline = self.interval;
        let results = join_all(checks.iter().map(|c| async move {
            tokio::time::timeout(deadline, c.checker.check())
                .await
                .unwrap_or_else(|_| Err(format!("check timed out after {deadline:?}")))
        }))
        .await;
        let now = Instant::now();

        for (check, result) in checks.iter().zip(results) {
            let healthy = result.is_ok();
            metrics::record_health_check(&check.name, healthy);

            let Ok(mut slot) = check.state.lock() else {
                continue;
            };
            let was_healthy = slot.as_ref().map(|s| s.status == Status::Ok);
            let next = CheckState::record(slot.as_ref(), result, now);

            match (was_healthy, healthy) {
                (Some(true) | None, false) => {
                    tracing::warn!(check = %check.name, message = %next.message, "Health check failing")
                }
                (Some(false), true) => tracing::info!(check = %check.name, "Health check recovered"),
                _ => tracing::trace!(check = %check.name, healthy, "Health check ran"),
            }
            *slot = Some(next);
        }
    }

    /// Aggregate status over the latest results.
    pub fn status(&self) -> Status {
        let checks = self.snapshot();
        let states: Vec<Option<CheckState>> = checks
            .iter()
            .map(|c| c.state.lock().ok().and_then(|s| s.clone()))
            .collect();
        aggregate(states.iter().map(Option::as_ref), self.critical_timeout, Instant::now())
    }

    pub fn report(&self) -> HealthReport {
        let checks = self
            .snapshot()
            .iter()
            .map(|c| {
                let state = c.state.lock().ok().and_then(|s| s.clone());
                CheckReport {
                    name: c.name.clone(),
                    status: state.as_ref().map(|s| s.status),
                    message: state.as_ref().map(|s| s.message.clone()),
                    last_checked: state.as_ref().map(|s| unix_millis(s.last_checked)),
                    last_success: state.as_ref().and_then(|s| s.last_success).map(unix_millis),
                    last_failure: state.as_ref().and_then(|s| s.last_failure).map(unix_millis),
                }
            })
            .collect();

        HealthReport {
            status: self.status(),
            version: self.version.clone(),
            uptime_ms: self.started.elapsed().as_millis() as u64,
            checks,
        }
    }
}
