//! Managed adapter process

use crate::runtime::command::{LaunchCommand, LaunchError};
use crate::runtime::output::{spawn_output_relay, OutputSink};
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::process::{Child, Command};
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// How a process left the tracked set
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    /// Exited on its own before any signal was sent
    AlreadyExited,
    /// Exited within the grace period after SIGTERM
    Graceful,
    /// Killed after the grace period
    Forced,
}

/// The supervisor's live view of one spawned adapter
pub struct ProcessHandle {
    pub name: String,
    pub port: u16,
    pub pid: Option<u32>,
    pub started_at: Instant,
    /// Set once the exit has been observed
    pub exit_status: Option<ExitStatus>,
    child: Child,
    exited_tx: watch::Sender<bool>,
    relay: Option<JoinHandle<()>>,
}

impl std::fmt::Debug for ProcessHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessHandle")
            .field("name", &self.name)
            .field("port", &self.port)
            .field("pid", &self.pid)
            .field("exit_status", &self.exit_status)
            .finish()
    }
}

impl ProcessHandle {
    /// Spawn the command and start its output relay
    pub fn spawn<S>(
        name: &str,
        port: u16,
        command: &LaunchCommand,
        sink: Arc<S>,
    ) -> Result<Self, LaunchError>
    where
        S: OutputSink + ?Sized,
    {
        let mut cmd = Command::new(&command.program);
        cmd.args(&command.args)
            .envs(&command.env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|e| LaunchError::Spawn {
            name: name.to_string(),
            source: e,
        })?;

        let pid = child.id();
        let (exited_tx, exited_rx) = watch::channel(false);
        let relay = spawn_output_relay(
            name.to_string(),
            child.stdout.take(),
            child.stderr.take(),
            sink,
            exited_rx,
        );

        Ok(Self {
            name: name.to_string(),
            port,
            pid,
            started_at: Instant::now(),
            exit_status: None,
            child,
            exited_tx,
            relay: Some(relay),
        })
    }

    /// Still running as far as the supervisor has observed
    pub fn running(&self) -> bool {
        self.exit_status.is_none()
    }

    /// Exit code, absent while running or when killed by a signal
    pub fn exit_code(&self) -> Option<i32> {
        self.exit_status.and_then(|s| s.code())
    }

    pub fn uptime(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// Non-blocking liveness check; records the exit status once observed
    pub fn try_wait(&mut self) -> std::io::Result<Option<ExitStatus>> {
        if let Some(status) = self.exit_status {
            return Ok(Some(status));
        }
        let status = self.child.try_wait()?;
        if let Some(status) = status {
            self.mark_exited(status);
        }
        Ok(status)
    }

    fn mark_exited(&mut self, status: ExitStatus) {
        self.exit_status = Some(status);
        let _ = self.exited_tx.send(true);
    }

    /// SIGTERM, wait up to `grace`, then SIGKILL and reap
    pub async fn terminate(&mut self, grace: Duration) -> std::io::Result<StopOutcome> {
        if self.try_wait()?.is_some() {
            self.finish_relay().await;
            return Ok(StopOutcome::AlreadyExited);
        }

        log::info!("[{}] Stopping process...", self.name);
        self.request_termination();

        let outcome = match tokio::time::timeout(grace, self.child.wait()).await {
            Ok(status) => {
                self.mark_exited(status?);
                StopOutcome::Graceful
            }
            Err(_) => {
                log::warn!(
                    "[{}] Process did not exit within {:?}, forcing kill",
                    self.name,
                    grace
                );
                // Child::kill sends SIGKILL and reaps
                self.child.kill().await?;
                let status = self.child.wait().await?;
                self.mark_exited(status);
                StopOutcome::Forced
            }
        };

        self.finish_relay().await;
        Ok(outcome)
    }

    #[cfg(unix)]
    fn request_termination(&self) {
        use nix::sys::signal::{kill, Signal};
        use nix::unistd::Pid;

        if let Some(pid) = self.pid {
            if let Err(e) = kill(Pid::from_raw(pid as i32), Signal::SIGTERM) {
                log::debug!("[{}] SIGTERM failed: {}", self.name, e);
            }
        }
    }

    #[cfg(not(unix))]
    fn request_termination(&mut self) {
        // No SIGTERM equivalent; the grace wait ends immediately after kill
        let _ = self.child.start_kill();
    }

    /// Wait for the relay to drain what the process wrote before exiting
    async fn finish_relay(&mut self) {
        if let Some(relay) = self.relay.take() {
            let _ = relay.await;
        }
    }
}

impl Drop for ProcessHandle {
    fn drop(&mut self) {
        let _ = self.exited_tx.send(true);
    }
}
