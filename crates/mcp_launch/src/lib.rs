//! MCP Launch
//!
//! Supervisor for MCP tool adapters. Each adapter runs as its own child
//! process behind an `mcp-proxy` bridge that serves it over SSE on a
//! dedicated port.
//!
//! # Overview
//!
//! The supervisor:
//! - Reads adapter definitions from a YAML service file
//! - Launches every enabled adapter with per-port package caches and environment overrides
//! - Relays each adapter's output prefixed with its name
//! - Reports adapters that exit and drops them from the tracked set
//! - Stops the whole fleet on Ctrl+C / SIGTERM (SIGTERM, then SIGKILL)
//!
//! Crashed adapters are not restarted.
//!
//! # Example Service File
//!
//! ```yaml
//! customermcp:
//!   - name: fetch
//!     package: "@modelcontextprotocol/server-fetch"
//!     port: 9001
//!   - name: grafana
//!     type: uv
//!     package: mcp-grafana
//!     directory: /opt/mcp-grafana
//!     port: 9003
//!     env:
//!       GRAFANA_URL: "http://grafana:3000"
//!
//! basicmcp:
//!   - name: bash
//!     path: servers/bash_server.py
//!     port: 9002
//!     enabled: false
//! ```

pub mod cli;
pub mod config;
pub mod runtime;

pub use cli::{Command, LaunchArgs, ListArgs, OutputFormat, RunArgs, ValidateArgs};
pub use config::{
    Catalog, ConfigError, DefinitionError, PackageRunner, ServiceDefinition, ServiceFile,
    ServiceKind,
};
pub use runtime::{
    BridgeCommand, CommandContext, ExitReport, HealthMonitor, LaunchCommand, LaunchError,
    LaunchSummary, MonitorConfig, OutputSink, ProcessHandle, ProcessRegistry, ServicePlan,
    ShutdownCoordinator, ShutdownSummary, StdoutSink, Supervisor, SupervisorConfig,
};
