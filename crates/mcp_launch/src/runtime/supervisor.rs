//! Supervisor - launches adapters, watches them and tears them down

use crate::config::{
    Catalog, Collection, DefinitionError, PackageRunner, ServiceDefinition, ServiceKind,
};
use crate::runtime::command::{CommandContext, LaunchError};
use crate::runtime::monitor::{HealthMonitor, MonitorConfig};
use crate::runtime::output::OutputSink;
use crate::runtime::process::ProcessHandle;
use crate::runtime::registry::ProcessRegistry;
use crate::runtime::shutdown::{ShutdownCoordinator, ShutdownSummary, DEFAULT_SHUTDOWN_TIMEOUT};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

/// Supervisor timing configuration
#[derive(Debug, Clone, Copy)]
pub struct SupervisorConfig {
    pub monitor: MonitorConfig,
    /// Grace period between SIGTERM and SIGKILL per process
    pub shutdown_timeout: Duration,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            monitor: MonitorConfig::default(),
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
        }
    }
}

/// Result of one launch pass
#[derive(Debug, Default)]
pub struct LaunchSummary {
    /// Names of the services now tracked
    pub started: Vec<String>,
    /// Names of disabled services
    pub skipped: Vec<String>,
    pub failed: Vec<LaunchError>,
}

pub struct Supervisor {
    catalog: Catalog,
    context: CommandContext,
    config: SupervisorConfig,
    registry: ProcessRegistry,
    coordinator: ShutdownCoordinator,
    sink: Arc<dyn OutputSink>,
}

impl Supervisor {
    pub fn new(
        catalog: Catalog,
        context: CommandContext,
        config: SupervisorConfig,
        sink: Arc<dyn OutputSink>,
    ) -> Self {
        let registry = ProcessRegistry::new();
        let coordinator = ShutdownCoordinator::new(registry.clone(), config.shutdown_timeout);
        Self {
            catalog,
            context,
            config,
            registry,
            coordinator,
            sink,
        }
    }

    pub fn registry(&self) -> &ProcessRegistry {
        &self.registry
    }

    pub fn coordinator(&self) -> &ShutdownCoordinator {
        &self.coordinator
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// Spawn every enabled definition, packages first.
    ///
    /// A failing definition is logged and skipped; the rest still start.
    pub async fn launch_all(&self) -> LaunchSummary {
        let mut summary = LaunchSummary::default();

        for def in &self.catalog.definitions {
            if self.coordinator.stop_requested() {
                log::info!("Shutdown requested, aborting launch");
                break;
            }
            if !def.enabled {
                log::info!("[{}] Skipped (disabled)", def.name);
                summary.skipped.push(def.name.clone());
                continue;
            }

            match self.launch(def).await {
                Ok(()) => summary.started.push(def.name.clone()),
                Err(e) => {
                    log::error!("[{}] {}", def.name, e);
                    summary.failed.push(e);
                }
            }
        }

        summary
    }

    async fn launch(&self, def: &ServiceDefinition) -> Result<(), LaunchError> {
        let command = self.context.build(def)?;
        log::info!("[{}] Starting [{}] on port {}", def.name, def.kind.label(), def.port);
        log::debug!("[{}] Command: {}", def.name, command);

        let handle = ProcessHandle::spawn(&def.name, def.port, &command, self.sink.clone())?;
        log::info!(
            "[{}] Started with PID {}, SSE: {}",
            def.name,
            handle
                .pid
                .map(|p| p.to_string())
                .unwrap_or_else(|| "?".to_string()),
            def.sse_url()
        );
        self.registry.add(handle).await;
        Ok(())
    }

    /// Launch, monitor until a stop is requested, then stop everything
    pub async fn run(&self) -> ShutdownSummary {
        let summary = self.launch_all().await;

        if summary.started.is_empty() {
            log::warn!("No services were started, check the service file");
            return self.coordinator.stop_all().await;
        }

        log::info!("Started {} service(s)", summary.started.len());
        log::info!("SSE endpoints:");
        for def in self.catalog.enabled() {
            if summary.started.contains(&def.name) {
                log::info!("  - {}: {}", def.name, def.sse_url());
            }
        }
        log::info!("Press Ctrl+C to stop all services");

        let monitor = HealthMonitor::new(self.registry.clone(), self.config.monitor);
        let mut stop_rx = self.coordinator.subscribe();
        monitor.initial_check(&mut stop_rx).await;
        monitor.run(stop_rx).await;

        self.coordinator.stop_all().await
    }

    /// Describe every definition without starting anything
    pub fn plan(&self) -> ServicePlan {
        let entries = self
            .catalog
            .definitions
            .iter()
            .map(|def| {
                let (command, error) = match self.context.build(def) {
                    Ok(cmd) => (Some(cmd.to_string()), None),
                    Err(e) => (None, Some(e.to_string())),
                };
                PlanEntry {
                    definition: def.clone(),
                    endpoint: def.sse_url(),
                    command,
                    error,
                }
            })
            .collect();

        ServicePlan {
            entries,
            rejected: self.catalog.rejected.clone(),
            show_commands: false,
        }
    }
}

/// Listing of configured services
#[derive(Debug, Serialize)]
pub struct ServicePlan {
    pub entries: Vec<PlanEntry>,
    #[serde(serialize_with = "serialize_rejected")]
    pub rejected: Vec<DefinitionError>,
    /// Include composed command lines in the text rendering
    #[serde(skip)]
    pub show_commands: bool,
}

fn serialize_rejected<S>(rejected: &[DefinitionError], serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    serializer.collect_seq(rejected.iter().map(|r| r.to_string()))
}

#[derive(Debug, Serialize)]
pub struct PlanEntry {
    #[serde(flatten)]
    pub definition: ServiceDefinition,
    pub endpoint: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ServicePlan {
    pub fn with_commands(mut self, show: bool) -> Self {
        self.show_commands = show;
        self
    }

    fn fmt_collection(
        &self,
        f: &mut std::fmt::Formatter<'_>,
        collection: Collection,
        title: &str,
    ) -> std::fmt::Result {
        let entries: Vec<_> = self
            .entries
            .iter()
            .filter(|e| e.definition.kind.collection() == collection)
            .collect();
        if entries.is_empty() {
            return Ok(());
        }

        writeln!(f)?;
        writeln!(f, "{} ({}):", title, collection)?;
        for entry in entries {
            let def = &entry.definition;
            let status = if def.enabled { "enabled " } else { "disabled" };
            writeln!(f, "  [{}] {} [{}]", status, def.name, def.kind.label())?;
            match &def.kind {
                ServiceKind::Package { package, runner } => {
                    writeln!(f, "     Package: {}", package)?;
                    if let PackageRunner::Uv { directory } = runner {
                        writeln!(f, "     Directory: {}", directory.display())?;
                    }
                }
                ServiceKind::Script { path, interpreter } => {
                    writeln!(f, "     Path: {}", path.display())?;
                    writeln!(f, "     Interpreter: {}", interpreter)?;
                }
            }
            writeln!(f, "     Port: {}", def.port)?;
            if !def.env.is_empty() {
                let keys: Vec<_> = def.env.keys().map(String::as_str).collect();
                writeln!(f, "     Env: {}", keys.join(", "))?;
            }
            if self.show_commands {
                if let Some(command) = &entry.command {
                    writeln!(f, "     Command: {}", command)?;
                }
            }
            if let Some(error) = &entry.error {
                writeln!(f, "     Warning: {}", error)?;
            }
        }
        Ok(())
    }
}

/// Display the service plan in a human-readable format
impl std::fmt::Display for ServicePlan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "MCP Services")?;
        writeln!(f, "============")?;

        self.fmt_collection(f, Collection::Packages, "Package adapters")?;
        self.fmt_collection(f, Collection::Scripts, "Script adapters")?;

        if !self.rejected.is_empty() {
            writeln!(f)?;
            writeln!(f, "Rejected entries:")?;
            for rejected in &self.rejected {
                writeln!(f, "  - {}", rejected)?;
            }
        }

        let enabled = self.entries.iter().filter(|e| e.definition.enabled).count();
        writeln!(f)?;
        writeln!(
            f,
            "{} enabled, {} disabled, {} rejected",
            enabled,
            self.entries.len() - enabled,
            self.rejected.len()
        )
    }
}
