//! Periodic health checking.
//!
//! # Responsibilities
//! - Run every registered check on an interval
//! - Stop when the shutdown signal fires, even mid-check

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::time;

use super::HealthChecker;

pub struct HealthMonitor {
    checker: Arc<HealthChecker>,
    interval: Duration,
}

impl HealthMonitor {
    pub fn new(checker: Arc<HealthChecker>) -> Self {
        let interval = checker.interval();
        Self { checker, interval }
    }

    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        tracing::info!(interval = ?self.interval, "Health monitor starting");

        let mut ticker = time::interval(self.interval);
        ticker.set_missed_tick_behavior(time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    tokio::select! {
                        _ = self.checker.run_checks() => {}
                        _ = shutdown.recv() => {
                            tracing::info!("Health monitor received shutdown signal during checks");
                            break;
                        }
                    }
                }
                _ = shutdown.recv() => {
                    tracing::info!("Health monitor received shutdown signal, exiting loop");
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HealthCheckConfig;
    use crate::health::{Checker, Status, StoreCheck, REDIS_CHECK};
    use crate::lifecycle::Shutdown;
    use crate::store::MemoryStore;

    #[tokio::test]
    async fn test_monitor_runs_checks_and_stops() {
        let config = HealthCheckConfig {
            interval_secs: 1,
            critical_timeout_secs: 90,
        };
        let checker = Arc::new(HealthChecker::new(&config, "test"));
        checker.add_check(REDIS_CHECK, Arc::new(StoreCheck::new(Arc::new(MemoryStore::new()))));

        let shutdown = Shutdown::new();
        let handle = tokio::spawn(HealthMonitor::new(checker.clone()).run(shutdown.subscribe()));

        // first tick fires immediately
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(checker.status(), Status::Ok);

        shutdown.trigger();
        time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("monitor did not stop")
            .unwrap();
    }

    struct HangingCheck;

    #[async_trait::async_trait]
    impl Checker for HangingCheck {
        async fn check(&self) -> Result<(), String> {
            time::sleep(Duration::from_secs(3600)).await;
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_shutdown_interrupts_running_check() {
        let config = HealthCheckConfig {
            interval_secs: 60,
            critical_timeout_secs: 90,
        };
        let checker = Arc::new(HealthChecker::new(&config, "test"));
        checker.add_check("Hanging", Arc::new(HangingCheck));

        let shutdown = Shutdown::new();
        let handle = tokio::spawn(HealthMonitor::new(checker).run(shutdown.subscribe()));

        tokio::time::sleep(Duration::from_millis(100)).await;
        shutdown.trigger();
        time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("monitor did not stop")
            .unwrap();
    }
}
