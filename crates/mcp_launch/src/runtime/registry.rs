//! Tracked set of running adapters
//!
//! The registry is the single source of truth for what is running. Launch
//! appends, the health monitor prunes and shutdown drains; nobody touches the
//! underlying collection directly.

use crate::runtime::process::ProcessHandle;
use std::process::ExitStatus;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

/// Point-in-time view of one tracked process
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessSnapshot {
    pub name: String,
    pub port: u16,
    pub pid: Option<u32>,
    pub uptime: Duration,
}

/// Exit observed by [`ProcessRegistry::remove_if_exited`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExitReport {
    pub name: String,
    pub port: u16,
    pub pid: Option<u32>,
    /// Exit code; absent when terminated by a signal
    pub code: Option<i32>,
    /// Terminating signal on Unix
    pub signal: Option<i32>,
}

impl ExitReport {
    fn new(handle: &ProcessHandle, status: ExitStatus) -> Self {
        Self {
            name: handle.name.clone(),
            port: handle.port,
            pid: handle.pid,
            code: status.code(),
            signal: exit_signal(&status),
        }
    }

    /// Anything other than a clean zero exit
    pub fn is_abnormal(&self) -> bool {
        self.code != Some(0)
    }

    /// Human-readable exit description
    pub fn describe(&self) -> String {
        match (self.code, self.signal) {
            (Some(code), _) => format!("exit code {}", code),
            (None, Some(signal)) => format!("killed by signal {}", signal),
            (None, None) => "unknown exit status".to_string(),
        }
    }
}

#[cfg(unix)]
fn exit_signal(status: &ExitStatus) -> Option<i32> {
    use std::os::unix::process::ExitStatusExt;
    status.signal()
}

#[cfg(not(unix))]
fn exit_signal(_status: &ExitStatus) -> Option<i32> {
    None
}

/// Mutex-guarded collection of [`ProcessHandle`]s
#[derive(Debug, Clone, Default)]
pub struct ProcessRegistry {
    inner: Arc<Mutex<Vec<ProcessHandle>>>,
}

impl ProcessRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start tracking a process
    pub async fn add(&self, handle: ProcessHandle) {
        self.inner.lock().await.push(handle);
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.lock().await.is_empty()
    }

    /// Names, ports and pids of every tracked process
    pub async fn snapshot(&self) -> Vec<ProcessSnapshot> {
        self.inner
            .lock()
            .await
            .iter()
            .map(|h| ProcessSnapshot {
                name: h.name.clone(),
                port: h.port,
                pid: h.pid,
                uptime: h.uptime(),
            })
            .collect()
    }

    /// Remove every process that has exited and report each one.
    ///
    /// A handle is reported by exactly one call: it leaves the set in the
    /// same critical section in which its exit is observed.
    pub async fn remove_if_exited(&self) -> Vec<ExitReport> {
        let mut handles = self.inner.lock().await;
        let mut reports = Vec::new();

        handles.retain_mut(|handle| match handle.try_wait() {
            Ok(Some(status)) => {
                reports.push(ExitReport::new(handle, status));
                false
            }
            Ok(None) => true,
            Err(e) => {
                log::error!("[{}] Error checking process status: {}", handle.name, e);
                true
            }
        });

        reports
    }

    /// Take every tracked process out of the set
    pub async fn drain(&self) -> Vec<ProcessHandle> {
        std::mem::take(&mut *self.inner.lock().await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_report_describe() {
        let mut report = ExitReport {
            name: "a".to_string(),
            port: 9001,
            pid: Some(42),
            code: Some(0),
            signal: None,
        };
        assert!(!report.is_abnormal());
        assert_eq!(report.describe(), "exit code 0");

        report.code = Some(3);
        assert!(report.is_abnormal());

        report.code = None;
        report.signal = Some(9);
        assert!(report.is_abnormal());
        assert_eq!(report.describe(), "killed by signal 9");
    }

    #[tokio::test]
    async fn test_empty_registry() {
        let registry = ProcessRegistry::new();
        assert!(registry.is_empty().await);
        assert!(registry.snapshot().await.is_empty());
        assert!(registry.remove_if_exited().await.is_empty());
        assert!(registry.drain().await.is_empty());
    }
}
