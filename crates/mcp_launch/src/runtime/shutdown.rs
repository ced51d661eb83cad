//! Shutdown coordination: stop flag, signal handling and fleet termination

use crate::runtime::process::StopOutcome;
use crate::runtime::registry::ProcessRegistry;
use futures::future::join_all;
use std::time::Duration;
use tokio::sync::watch;

/// Default grace period between SIGTERM and SIGKILL
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Outcome of [`ShutdownCoordinator::stop_all`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShutdownSummary {
    /// Exited after SIGTERM
    pub graceful: Vec<String>,
    /// Killed after the grace period
    pub forced: Vec<String>,
    /// Had already exited when shutdown reached them
    pub already_exited: Vec<String>,
    /// Could not be signalled or reaped
    pub failed: Vec<String>,
}

impl ShutdownSummary {
    pub fn total(&self) -> usize {
        self.graceful.len() + self.forced.len() + self.already_exited.len() + self.failed.len()
    }
}

/// Owns the stop flag and the only path that terminates adapters
pub struct ShutdownCoordinator {
    registry: ProcessRegistry,
    grace: Duration,
    stop_tx: watch::Sender<bool>,
}

impl ShutdownCoordinator {
    pub fn new(registry: ProcessRegistry, grace: Duration) -> Self {
        let (stop_tx, _) = watch::channel(false);
        Self {
            registry,
            grace,
            stop_tx,
        }
    }

    /// Receiver that flips to `true` when a stop is requested
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.stop_tx.subscribe()
    }

    /// Raise the stop flag
    pub fn request_stop(&self) {
        self.stop_tx.send_replace(true);
    }

    pub fn stop_requested(&self) -> bool {
        *self.stop_tx.borrow()
    }

    /// Route SIGINT/SIGTERM/SIGHUP to the stop flag
    pub fn install_signal_handler(&self) -> Result<(), ctrlc::Error> {
        let stop_tx = self.stop_tx.clone();
        ctrlc::set_handler(move || {
            if *stop_tx.borrow() {
                log::warn!("Shutdown already in progress");
                return;
            }
            log::info!("Received shutdown signal, stopping all services...");
            stop_tx.send_replace(true);
        })
    }

    /// Terminate every tracked process.
    ///
    /// Processes are stopped concurrently, each with its own grace period, so
    /// the whole fleet is down within roughly one grace period.
    pub async fn stop_all(&self) -> ShutdownSummary {
        self.request_stop();

        let handles = self.registry.drain().await;
        if handles.is_empty() {
            return ShutdownSummary::default();
        }
        log::info!("Stopping {} service(s)...", handles.len());

        let grace = self.grace;
        let results = join_all(handles.into_iter().map(|mut handle| async move {
            let outcome = handle.terminate(grace).await;
            (handle.name.clone(), outcome)
        }))
        .await;

        let mut summary = ShutdownSummary::default();
        for (name, outcome) in results {
            match outcome {
                Ok(StopOutcome::Graceful) => summary.graceful.push(name),
                Ok(StopOutcome::Forced) => summary.forced.push(name),
                Ok(StopOutcome::AlreadyExited) => summary.already_exited.push(name),
                Err(e) => {
                    log::error!("[{}] Error stopping process: {}", name, e);
                    summary.failed.push(name);
                }
            }
        }

        log::info!(
            "All services stopped ({} graceful, {} forced)",
            summary.graceful.len(),
            summary.forced.len()
        );
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_request_stop_notifies_subscribers() {
        let coordinator =
            ShutdownCoordinator::new(ProcessRegistry::new(), DEFAULT_SHUTDOWN_TIMEOUT);
        let mut rx = coordinator.subscribe();
        assert!(!coordinator.stop_requested());

        coordinator.request_stop();
        rx.changed().await.unwrap();
        assert!(*rx.borrow());
        assert!(coordinator.stop_requested());
    }

    #[tokio::test]
    async fn test_stop_all_with_nothing_tracked() {
        let coordinator =
            ShutdownCoordinator::new(ProcessRegistry::new(), DEFAULT_SHUTDOWN_TIMEOUT);
        let summary = coordinator.stop_all().await;
        assert_eq!(summary.total(), 0);
        assert!(coordinator.stop_requested());
    }
}
