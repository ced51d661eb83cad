//! Health monitor: polls tracked processes and reports exits
//!
//! The monitor only observes. Crashed adapters are reported and pruned, never
//! restarted.

use crate::runtime::registry::{ExitReport, ProcessRegistry};
use std::time::Duration;
use tokio::sync::watch;

/// Monitor timing
#[derive(Debug, Clone, Copy)]
pub struct MonitorConfig {
    /// Delay before the first liveness pass, giving adapters time to bind
    pub settle_delay: Duration,
    /// Interval between liveness passes
    pub poll_interval: Duration,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            settle_delay: Duration::from_secs(2),
            poll_interval: Duration::from_secs(5),
        }
    }
}

pub struct HealthMonitor {
    registry: ProcessRegistry,
    config: MonitorConfig,
}

impl HealthMonitor {
    pub fn new(registry: ProcessRegistry, config: MonitorConfig) -> Self {
        Self { registry, config }
    }

    /// Wait for the settle delay, then log the state of every process.
    ///
    /// Returns the processes that already died during startup. Returns early
    /// with no reports if shutdown is requested while settling.
    pub async fn initial_check(
        &self,
        shutdown_rx: &mut watch::Receiver<bool>,
    ) -> Vec<ExitReport> {
        tokio::select! {
            biased;
            _ = wait_for_stop(shutdown_rx) => return Vec::new(),
            _ = tokio::time::sleep(self.config.settle_delay) => {}
        }

        log::info!("Checking service status...");
        let failed = self.registry.remove_if_exited().await;
        for report in &failed {
            log::error!(
                "[{}] Failed to start ({})",
                report.name,
                report.describe()
            );
        }
        for process in self.registry.snapshot().await {
            log::info!(
                "[{}] Running (pid {}, port {})",
                process.name,
                process
                    .pid
                    .map(|p| p.to_string())
                    .unwrap_or_else(|| "?".to_string()),
                process.port
            );
        }
        if !failed.is_empty() {
            log::warn!("{} service(s) failed to start, check the configuration", failed.len());
        }

        failed
    }

    /// One liveness pass: report and prune every exited process
    pub async fn poll_once(&self) -> Vec<ExitReport> {
        let reports = self.registry.remove_if_exited().await;
        for report in &reports {
            if report.is_abnormal() {
                log::warn!(
                    "[{}] Process exited unexpectedly ({})",
                    report.name,
                    report.describe()
                );
            } else {
                log::info!("[{}] Process exited ({})", report.name, report.describe());
            }
        }
        reports
    }

    /// Poll until the stop flag is raised
    pub async fn run(&self, mut shutdown_rx: watch::Receiver<bool>) {
        let mut interval = tokio::time::interval(self.config.poll_interval);
        // The first tick completes immediately; the initial check covers it
        interval.tick().await;

        loop {
            tokio::select! {
                biased;
                _ = wait_for_stop(&mut shutdown_rx) => {
                    log::debug!("Health monitor stopping");
                    break;
                }
                _ = interval.tick() => {
                    self.poll_once().await;
                }
            }
        }
    }
}

/// Resolves once the flag is `true` or the sender is gone
async fn wait_for_stop(shutdown_rx: &mut watch::Receiver<bool>) {
    let _ = shutdown_rx.wait_for(|stop| *stop).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    fn fast() -> MonitorConfig {
        MonitorConfig {
            settle_delay: Duration::from_millis(10),
            poll_interval: Duration::from_millis(20),
        }
    }

    #[tokio::test]
    async fn test_run_returns_promptly_on_stop() {
        let monitor = HealthMonitor::new(
            ProcessRegistry::new(),
            MonitorConfig {
                settle_delay: Duration::from_secs(60),
                poll_interval: Duration::from_secs(60),
            },
        );
        let (tx, rx) = watch::channel(false);

        let started = Instant::now();
        let run = monitor.run(rx);
        tokio::pin!(run);
        tokio::select! {
            _ = &mut run => panic!("monitor stopped without a stop request"),
            _ = tokio::time::sleep(Duration::from_millis(50)) => {}
        }
        tx.send(true).unwrap();
        run.await;
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_stop_already_requested() {
        let monitor = HealthMonitor::new(ProcessRegistry::new(), fast());
        let (_tx, mut rx) = watch::channel(true);
        assert!(monitor.initial_check(&mut rx).await.is_empty());
        monitor.run(rx).await;
    }

    #[tokio::test]
    async fn test_dropped_sender_stops_monitor() {
        let monitor = HealthMonitor::new(ProcessRegistry::new(), fast());
        let (tx, rx) = watch::channel(false);
        drop(tx);
        tokio::time::timeout(Duration::from_secs(1), monitor.run(rx))
            .await
            .unwrap();
    }
}
