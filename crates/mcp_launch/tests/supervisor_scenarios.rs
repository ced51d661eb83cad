//! Supervisor scenarios against real child processes
//!
//! `mcp-proxy` is replaced by `sh -c <script> bridge`, which receives the
//! composed bridge arguments as `$@` and never runs the inner command.

#![cfg(unix)]

use mcp_launch::{
    BridgeCommand, CommandContext, LaunchError, MonitorConfig, ServiceFile, Supervisor,
    SupervisorConfig,
};
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;

/// Prints its arguments, then sleeps until terminated
const ECHO_BRIDGE: &str = r#"echo "bridge $*"; exec sleep 30"#;

/// Ignores SIGTERM so only SIGKILL stops it
const STUBBORN_BRIDGE: &str = r#"trap '' TERM; echo ready; while true; do sleep 1; done"#;

struct Harness {
    supervisor: Supervisor,
    output: mpsc::UnboundedReceiver<String>,
    _dir: tempfile::TempDir,
}

fn harness(yaml: &str, bridge_script: &str, config: SupervisorConfig) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("tool.py"), "print('tool')\n").unwrap();
    let config_path = dir.path().join("mcp_config.yaml");
    std::fs::write(&config_path, yaml).unwrap();

    let catalog = ServiceFile::from_file(&config_path).unwrap().validate();
    assert!(catalog.rejected.is_empty(), "{:?}", catalog.rejected);

    let context = CommandContext {
        bridge: BridgeCommand::new("sh").with_args(["-c", bridge_script, "bridge"]),
        work_dir: dir.path().join("no-such-workdir"),
        config_dir: catalog.base_dir.clone(),
        cache_root: dir.path().join("cache"),
    };
    let (tx, output) = mpsc::unbounded_channel();
    Harness {
        supervisor: Supervisor::new(catalog, context, config, Arc::new(tx)),
        output,
        _dir: dir,
    }
}

fn fast_config() -> SupervisorConfig {
    SupervisorConfig {
        monitor: MonitorConfig {
            settle_delay: Duration::from_millis(50),
            poll_interval: Duration::from_millis(100),
        },
        shutdown_timeout: Duration::from_secs(5),
    }
}

async fn collect_lines(rx: &mut mpsc::UnboundedReceiver<String>, count: usize) -> Vec<String> {
    let mut lines = Vec::new();
    let deadline = Instant::now() + Duration::from_secs(5);
    while lines.len() < count && Instant::now() < deadline {
        if let Ok(Some(line)) = tokio::time::timeout(Duration::from_millis(100), rx.recv()).await {
            lines.push(line);
        }
    }
    lines
}

fn is_alive(pid: u32) -> bool {
    kill(Pid::from_raw(pid as i32), None).is_ok()
}

const FLEET: &str = r#"
customermcp:
  - name: fetch
    package: "@modelcontextprotocol/server-fetch"
    port: 9001
  - name: grafana
    type: uv
    package: mcp-grafana
    directory: /opt/grafana
    port: 9003
  - name: parked
    package: parked-server
    port: 9004
    enabled: false
basicmcp:
  - name: tool
    path: tool.py
    port: 9002
"#;

#[tokio::test]
async fn enabled_definitions_are_spawned_on_their_ports() {
    let mut h = harness(FLEET, ECHO_BRIDGE, fast_config());

    let summary = h.supervisor.launch_all().await;
    assert_eq!(summary.started, vec!["fetch", "grafana", "tool"]);
    assert_eq!(summary.skipped, vec!["parked"]);
    assert!(summary.failed.is_empty());

    let snapshot = h.supervisor.registry().snapshot().await;
    let tracked: Vec<_> = snapshot.iter().map(|p| (p.name.as_str(), p.port)).collect();
    assert_eq!(tracked, vec![("fetch", 9001), ("grafana", 9003), ("tool", 9002)]);

    let mut lines = collect_lines(&mut h.output, 3).await;
    lines.sort();
    assert_eq!(lines.len(), 3);
    assert!(lines[0].starts_with("[fetch] bridge --port 9001 --server sse -- npx -y"));
    assert!(lines[1].starts_with(
        "[grafana] bridge --port 9003 --server sse -- uv --directory /opt/grafana run mcp-grafana"
    ));
    assert!(lines[2].starts_with("[tool] bridge --port 9002 --server sse -- python3 "));
    assert!(lines[2].ends_with("tool.py"));

    let stopped = h.supervisor.coordinator().stop_all().await;
    assert_eq!(stopped.total(), 3);
}

#[tokio::test]
async fn missing_script_does_not_block_other_services() {
    let mut h = harness(
        r#"
customermcp:
  - { name: fetch, package: server-fetch, port: 9101 }
basicmcp:
  - { name: ghost, path: servers/ghost.py, port: 9102 }
  - { name: tool, path: tool.py, port: 9103 }
"#,
        ECHO_BRIDGE,
        fast_config(),
    );

    let summary = h.supervisor.launch_all().await;
    assert_eq!(summary.started, vec!["fetch", "tool"]);
    assert_eq!(summary.failed.len(), 1);
    match &summary.failed[0] {
        LaunchError::ScriptNotFound { name, tried } => {
            assert_eq!(name, "ghost");
            assert_eq!(tried.len(), 2);
        }
        other => panic!("unexpected error {:?}", other),
    }
    assert_eq!(h.supervisor.registry().len().await, 2);

    assert_eq!(collect_lines(&mut h.output, 2).await.len(), 2);
    h.supervisor.coordinator().stop_all().await;
}

#[tokio::test]
async fn spawn_failure_is_isolated() {
    let h = harness(
        "customermcp:\n  - { name: fetch, package: p, port: 9151 }\n",
        ECHO_BRIDGE,
        fast_config(),
    );
    let broken = Supervisor::new(
        h.supervisor.catalog().clone(),
        CommandContext {
            bridge: BridgeCommand::new("/definitely/not/a/bridge"),
            work_dir: Path::new("/").to_path_buf(),
            config_dir: Path::new("/").to_path_buf(),
            cache_root: std::env::temp_dir(),
        },
        fast_config(),
        Arc::new(mpsc::unbounded_channel::<String>().0),
    );

    let summary = broken.launch_all().await;
    assert!(summary.started.is_empty());
    assert!(matches!(summary.failed[0], LaunchError::Spawn { .. }));
    assert!(broken.registry().is_empty().await);
}

#[tokio::test]
async fn externally_killed_process_is_reported_once() {
    let h = harness(
        r#"
customermcp:
  - { name: victim, package: p, port: 9201 }
  - { name: survivor, package: p, port: 9202 }
"#,
        ECHO_BRIDGE,
        fast_config(),
    );
    h.supervisor.launch_all().await;

    let snapshot = h.supervisor.registry().snapshot().await;
    let victim = snapshot[0].pid.unwrap();
    let survivor = snapshot[1].pid.unwrap();
    kill(Pid::from_raw(victim as i32), Signal::SIGKILL).unwrap();

    let monitor = mcp_launch::HealthMonitor::new(
        h.supervisor.registry().clone(),
        fast_config().monitor,
    );
    let mut reports = Vec::new();
    let deadline = Instant::now() + Duration::from_secs(5);
    while reports.is_empty() && Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(50)).await;
        reports = monitor.poll_once().await;
    }

    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].name, "victim");
    assert_eq!(reports[0].port, 9201);
    assert_eq!(reports[0].signal, Some(Signal::SIGKILL as i32));
    assert!(reports[0].is_abnormal());

    assert!(monitor.poll_once().await.is_empty());
    let remaining = h.supervisor.registry().snapshot().await;
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].name, "survivor");
    assert!(is_alive(survivor));

    h.supervisor.coordinator().stop_all().await;
}

#[tokio::test]
async fn stop_all_terminates_every_tracked_process() {
    let h = harness(FLEET, ECHO_BRIDGE, fast_config());
    h.supervisor.launch_all().await;

    let pids: Vec<u32> = h
        .supervisor
        .registry()
        .snapshot()
        .await
        .iter()
        .filter_map(|p| p.pid)
        .collect();
    assert_eq!(pids.len(), 3);

    let summary = h.supervisor.coordinator().stop_all().await;
    assert_eq!(summary.graceful.len(), 3);
    assert!(summary.forced.is_empty());
    assert!(h.supervisor.registry().is_empty().await);
    assert!(pids.iter().all(|pid| !is_alive(*pid)));
}

#[tokio::test]
async fn stubborn_process_is_killed_after_grace_period() {
    let config = SupervisorConfig {
        shutdown_timeout: Duration::from_millis(300),
        ..fast_config()
    };
    let mut h = harness(
        "customermcp:\n  - { name: stubborn, package: p, port: 9301 }\n",
        STUBBORN_BRIDGE,
        config,
    );
    h.supervisor.launch_all().await;

    // The trap is installed once the shell prints
    assert_eq!(collect_lines(&mut h.output, 1).await, vec!["[stubborn] ready"]);
    let pid = h.supervisor.registry().snapshot().await[0].pid.unwrap();

    let started = Instant::now();
    let summary = h.supervisor.coordinator().stop_all().await;
    assert_eq!(summary.forced, vec!["stubborn"]);
    assert!(started.elapsed() >= Duration::from_millis(300));
    assert!(!is_alive(pid));
}

#[tokio::test]
async fn stop_request_ends_run_and_cleans_up() {
    let h = harness(
        r#"
customermcp:
  - { name: a, package: p, port: 9401 }
basicmcp:
  - { name: b, path: tool.py, port: 9402 }
"#,
        ECHO_BRIDGE,
        fast_config(),
    );
    let supervisor = Arc::new(h.supervisor);

    let run = tokio::spawn({
        let supervisor = supervisor.clone();
        async move { supervisor.run().await }
    });

    let deadline = Instant::now() + Duration::from_secs(5);
    while supervisor.registry().len().await < 2 && Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    let pids: Vec<u32> = supervisor
        .registry()
        .snapshot()
        .await
        .iter()
        .filter_map(|p| p.pid)
        .collect();
    assert_eq!(pids.len(), 2);

    supervisor.coordinator().request_stop();
    let summary = tokio::time::timeout(Duration::from_secs(10), run)
        .await
        .expect("run should return after a stop request")
        .unwrap();

    assert_eq!(summary.total(), 2);
    assert!(supervisor.registry().is_empty().await);
    assert!(pids.iter().all(|pid| !is_alive(*pid)));
}

#[tokio::test]
async fn children_inherit_parent_environment_with_overrides() {
    let mut h = harness(
        r#"
customermcp:
  - name: envcheck
    package: p
    port: 9501
    env:
      API_KEY: secret
"#,
        r#"echo "path=$PATH"; echo "key=$API_KEY npx=$NPX_HOME"; exec sleep 30"#,
        fast_config(),
    );
    h.supervisor.launch_all().await;

    let lines = collect_lines(&mut h.output, 2).await;
    let path = std::env::var("PATH").unwrap_or_default();
    assert_eq!(lines[0], format!("[envcheck] path={}", path));
    assert!(lines[1].starts_with("[envcheck] key=secret npx="));
    assert!(lines[1].ends_with("npx-9501"));

    h.supervisor.coordinator().stop_all().await;
}
