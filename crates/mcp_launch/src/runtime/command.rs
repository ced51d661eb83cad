//! Command line and environment composition for adapters
//!
//! Every adapter runs behind a bridge that exposes its stdio protocol as an
//! SSE endpoint on the adapter's port:
//!
//! ```text
//! <bridge> --port <port> --server sse -- <inner command...>
//! ```

use crate::config::{PackageRunner, ServiceDefinition, ServiceKind};
use indexmap::IndexMap;
use std::fmt;
use std::path::{Path, PathBuf};

/// Bridge binary looked up on PATH before falling back to npx
pub const BRIDGE_BINARY: &str = "mcp-proxy";

/// Program and leading arguments used to start the bridge
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeCommand {
    pub program: String,
    pub args: Vec<String>,
}

impl BridgeCommand {
    /// Use the pre-installed bridge when available, otherwise fetch it with npx.
    ///
    /// Concurrent `npx -y mcp-proxy` installs race on the npm cache, so the
    /// installed binary always wins.
    pub fn detect() -> Self {
        match which::which(BRIDGE_BINARY) {
            Ok(path) => {
                log::debug!("Using installed bridge at {}", path.display());
                Self::new(BRIDGE_BINARY)
            }
            Err(_) => {
                log::debug!("{} not on PATH, falling back to npx", BRIDGE_BINARY);
                Self::new("npx").with_args(["-y", BRIDGE_BINARY])
            }
        }
    }

    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }
}

/// Everything needed to spawn one adapter
#[derive(Debug, Clone)]
pub struct LaunchCommand {
    pub program: String,
    pub args: Vec<String>,
    /// Variables set on top of the inherited parent environment
    pub env: IndexMap<String, String>,
}

impl fmt::Display for LaunchCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

/// Inputs shared by every command built during one launch pass
#[derive(Debug, Clone)]
pub struct CommandContext {
    pub bridge: BridgeCommand,
    /// Supervisor working directory, first root for relative scripts
    pub work_dir: PathBuf,
    /// Service file directory, second root for relative scripts
    pub config_dir: PathBuf,
    /// Parent directory for per-port package caches
    pub cache_root: PathBuf,
}

impl CommandContext {
    /// Context built from the current process
    pub fn from_env(bridge: BridgeCommand, config_dir: PathBuf) -> Self {
        Self {
            bridge,
            work_dir: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            config_dir,
            cache_root: std::env::temp_dir(),
        }
    }

    /// Build the full bridge-wrapped command for a definition
    pub fn build(&self, def: &ServiceDefinition) -> Result<LaunchCommand, LaunchError> {
        let inner = self.inner_command(def)?;

        let mut args = self.bridge.args.clone();
        args.extend([
            "--port".to_string(),
            def.port.to_string(),
            "--server".to_string(),
            "sse".to_string(),
            "--".to_string(),
        ]);
        args.extend(inner);

        Ok(LaunchCommand {
            program: self.bridge.program.clone(),
            args,
            env: self.environment(def),
        })
    }

    /// Adapter command run by the bridge
    pub fn inner_command(&self, def: &ServiceDefinition) -> Result<Vec<String>, LaunchError> {
        let command = match &def.kind {
            ServiceKind::Package {
                package,
                runner: PackageRunner::Npm,
            } => vec!["npx".to_string(), "-y".to_string(), package.clone()],
            ServiceKind::Package {
                package,
                runner: PackageRunner::Uv { directory },
            } => vec![
                "uv".to_string(),
                "--directory".to_string(),
                directory.display().to_string(),
                "run".to_string(),
                package.clone(),
            ],
            ServiceKind::Script { path, interpreter } => {
                let script = self.resolve_script(&def.name, path)?;
                vec![interpreter.clone(), script.display().to_string()]
            }
        };
        Ok(command)
    }

    /// Resolve a script path against the working directory, then the config directory
    pub fn resolve_script(&self, name: &str, path: &Path) -> Result<PathBuf, LaunchError> {
        let candidates = if path.is_absolute() {
            vec![path.to_path_buf()]
        } else {
            vec![self.work_dir.join(path), self.config_dir.join(path)]
        };

        candidates
            .iter()
            .find(|candidate| candidate.exists())
            .cloned()
            .ok_or_else(|| LaunchError::ScriptNotFound {
                name: name.to_string(),
                tried: candidates,
            })
    }

    /// Bridge settings, per-port caches, then overrides.
    ///
    /// The child inherits the parent environment as-is (non-UTF8 values
    /// included); this map is applied on top of it.
    pub fn environment(&self, def: &ServiceDefinition) -> IndexMap<String, String> {
        let mut env = IndexMap::new();
        env.insert("NODE_TLS_REJECT_UNAUTHORIZED".to_string(), "0".to_string());
        env.insert(
            "npm_config_cache".to_string(),
            self.cache_dir("npm-cache", def.port),
        );
        env.insert("NPX_HOME".to_string(), self.cache_dir("npx", def.port));
        for (key, value) in &def.env {
            env.insert(key.clone(), value.clone());
        }
        env
    }

    fn cache_dir(&self, prefix: &str, port: u16) -> String {
        self.cache_root
            .join(format!("{}-{}", prefix, port))
            .display()
            .to_string()
    }
}

/// Errors that can occur while launching a single adapter
#[derive(Debug, thiserror::Error)]
pub enum LaunchError {
    #[error("Script for '{name}' not found (tried: {})", format_paths(tried))]
    ScriptNotFound { name: String, tried: Vec<PathBuf> },

    #[error("Failed to spawn '{name}': {source}")]
    Spawn {
        name: String,
        #[source]
        source: std::io::Error,
    },
}

fn format_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}
