//! Service file YAML schema definitions
//!
//! The file holds two ordered collections: `customermcp` for adapters
//! fetched from a package registry and `basicmcp` for adapters backed by
//! local scripts. Each collection is read as raw YAML nodes; entries are then
//! decoded and validated one by one, so a broken entry only rejects itself.

use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};

/// Default name given to entries that omit `name`
pub const UNNAMED: &str = "unnamed";

/// Default interpreter used to run local scripts
pub const DEFAULT_INTERPRETER: &str = "python3";

/// Root service file as written on disk
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServiceFile {
    /// Adapters launched from published packages
    #[serde(
        default,
        rename = "customermcp",
        alias = "packages",
        deserialize_with = "null_as_empty"
    )]
    pub packages: Vec<serde_yaml::Value>,

    /// Adapters launched from local scripts
    #[serde(
        default,
        rename = "basicmcp",
        alias = "scripts",
        deserialize_with = "null_as_empty"
    )]
    pub scripts: Vec<serde_yaml::Value>,

    /// Directory of the file, used to resolve relative script paths
    #[serde(skip)]
    pub base_dir: PathBuf,
}

/// `customermcp:` with no items is `null` in YAML
fn null_as_empty<'de, D>(deserializer: D) -> Result<Vec<serde_yaml::Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Vec<serde_yaml::Value>>::deserialize(deserializer)?.unwrap_or_default())
}

/// One unvalidated entry of either collection
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServiceEntry {
    #[serde(default)]
    pub name: Option<String>,

    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Kept loose so a bad port rejects only this entry
    #[serde(default)]
    pub port: Option<serde_yaml::Value>,

    #[serde(default)]
    pub env: IndexMap<String, EnvValue>,

    /// Package runner: `npm` (default) or `uv`
    #[serde(default, rename = "type")]
    pub runner: Option<String>,

    #[serde(default)]
    pub package: Option<String>,

    /// Project directory for the `uv` runner
    #[serde(default)]
    pub directory: Option<String>,

    /// Script path for local adapters
    #[serde(default)]
    pub path: Option<String>,

    /// Interpreter for local adapters
    #[serde(default)]
    pub interpreter: Option<String>,
}

fn default_enabled() -> bool {
    true
}

impl ServiceEntry {
    /// Decode one raw collection item
    pub fn from_value(value: &serde_yaml::Value) -> Result<Self, String> {
        if !value.is_mapping() {
            return Err("entry is not a mapping".to_string());
        }
        serde_yaml::from_value(value.clone()).map_err(|e| e.to_string())
    }

    /// Display name, falling back to [`UNNAMED`]
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(UNNAMED)
    }
}

/// Best-effort name of an entry that could not be decoded
fn raw_name(value: &serde_yaml::Value) -> &str {
    value
        .get("name")
        .and_then(serde_yaml::Value::as_str)
        .unwrap_or(UNNAMED)
}

/// Environment values can be strings, booleans, or numbers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EnvValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
}

impl EnvValue {
    /// Convert to string representation
    pub fn as_str(&self) -> String {
        match self {
            EnvValue::Bool(b) => b.to_string(),
            EnvValue::Int(i) => i.to_string(),
            EnvValue::Float(f) => f.to_string(),
            EnvValue::String(s) => s.clone(),
        }
    }
}

/// Which top-level collection an entry came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Collection {
    Packages,
    Scripts,
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Collection::Packages => write!(f, "customermcp"),
            Collection::Scripts => write!(f, "basicmcp"),
        }
    }
}

/// How a package adapter is run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "runner", rename_all = "lowercase")]
pub enum PackageRunner {
    /// `npx -y <package>`
    Npm,
    /// `uv --directory <dir> run <package>`
    Uv { directory: PathBuf },
}

/// Kind-specific part of a service definition
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ServiceKind {
    Package {
        package: String,
        #[serde(flatten)]
        runner: PackageRunner,
    },
    Script {
        /// Path as written in the file; resolved at launch time
        path: PathBuf,
        interpreter: String,
    },
}

impl ServiceKind {
    /// Short label: `npm`, `uv` or `script`
    pub fn label(&self) -> &'static str {
        match self {
            ServiceKind::Package {
                runner: PackageRunner::Npm,
                ..
            } => "npm",
            ServiceKind::Package {
                runner: PackageRunner::Uv { .. },
                ..
            } => "uv",
            ServiceKind::Script { .. } => "script",
        }
    }

    /// What the adapter runs: a package identifier or a script path
    pub fn target(&self) -> String {
        match self {
            ServiceKind::Package { package, .. } => package.clone(),
            ServiceKind::Script { path, .. } => path.display().to_string(),
        }
    }

    pub fn collection(&self) -> Collection {
        match self {
            ServiceKind::Package { .. } => Collection::Packages,
            ServiceKind::Script { .. } => Collection::Scripts,
        }
    }
}

/// A validated adapter definition
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServiceDefinition {
    pub name: String,
    pub enabled: bool,
    pub port: u16,
    pub env: IndexMap<String, String>,
    #[serde(flatten)]
    pub kind: ServiceKind,
}

impl ServiceDefinition {
    /// SSE endpoint exposed by the bridge
    pub fn sse_url(&self) -> String {
        format!("http://localhost:{}/sse", self.port)
    }
}

/// Result of validating a service file
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    /// Valid definitions, packages first, in file order
    pub definitions: Vec<ServiceDefinition>,
    /// Entries that failed validation
    pub rejected: Vec<DefinitionError>,
    /// Directory of the service file
    pub base_dir: PathBuf,
}

impl Catalog {
    /// Definitions that should be launched
    pub fn enabled(&self) -> impl Iterator<Item = &ServiceDefinition> {
        self.definitions.iter().filter(|d| d.enabled)
    }

    /// Number of valid but disabled definitions
    pub fn disabled_count(&self) -> usize {
        self.definitions.iter().filter(|d| !d.enabled).count()
    }
}

impl ServiceFile {
    /// Load a service file from disk
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        let mut file = Self::from_yaml(&content)?;
        file.base_dir = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        Ok(file)
    }

    /// Parse a service file from a YAML string
    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        let value: serde_yaml::Value = serde_yaml::from_str(content)?;
        if value.is_null() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_value(value)?)
    }

    /// Validate every entry into a [`Catalog`]
    pub fn validate(&self) -> Catalog {
        let mut catalog = Catalog {
            base_dir: self.base_dir.clone(),
            ..Default::default()
        };
        // port -> name of the first enabled definition claiming it
        let mut claimed: HashMap<u16, String> = HashMap::new();

        let entries = self
            .packages
            .iter()
            .enumerate()
            .map(|(i, e)| (Collection::Packages, i, e))
            .chain(
                self.scripts
                    .iter()
                    .enumerate()
                    .map(|(i, e)| (Collection::Scripts, i, e)),
            );

        for (collection, index, value) in entries {
            let entry = match ServiceEntry::from_value(value) {
                Ok(entry) => entry,
                Err(reason) => {
                    catalog.rejected.push(DefinitionError {
                        collection,
                        index,
                        name: raw_name(value).to_string(),
                        reason,
                    });
                    continue;
                }
            };
            let reject = |reason: String| DefinitionError {
                collection,
                index,
                name: entry.display_name().to_string(),
                reason,
            };

            let definition = match validate_entry(collection, &entry) {
                Ok(definition) => definition,
                Err(reason) => {
                    catalog.rejected.push(reject(reason));
                    continue;
                }
            };

            if definition.enabled {
                if let Some(owner) = claimed.get(&definition.port) {
                    catalog.rejected.push(reject(format!(
                        "port {} already used by '{}'",
                        definition.port, owner
                    )));
                    continue;
                }
                claimed.insert(definition.port, definition.name.clone());
            }

            catalog.definitions.push(definition);
        }

        catalog
    }
}

fn validate_entry(
    collection: Collection,
    entry: &ServiceEntry,
) -> Result<ServiceDefinition, String> {
    let port = parse_port(entry.port.as_ref())?;

    let kind = match collection {
        Collection::Packages => {
            let package = required(&entry.package, "package")?;
            let runner = match entry.runner.as_deref().unwrap_or("npm") {
                "npm" => PackageRunner::Npm,
                "uv" => PackageRunner::Uv {
                    directory: PathBuf::from(required(&entry.directory, "directory")?),
                },
                other => {
                    return Err(format!(
                        "unknown package type '{}' (expected 'npm' or 'uv')",
                        other
                    ))
                }
            };
            ServiceKind::Package { package, runner }
        }
        Collection::Scripts => ServiceKind::Script {
            path: PathBuf::from(required(&entry.path, "path")?),
            interpreter: entry
                .interpreter
                .clone()
                .filter(|i| !i.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_INTERPRETER.to_string()),
        },
    };

    Ok(ServiceDefinition {
        name: entry.display_name().to_string(),
        enabled: entry.enabled,
        port,
        env: entry
            .env
            .iter()
            .map(|(k, v)| (k.clone(), v.as_str()))
            .collect(),
        kind,
    })
}

fn required(value: &Option<String>, field: &str) -> Result<String, String> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v.clone()),
        _ => Err(format!("missing '{}'", field)),
    }
}

fn parse_port(value: Option<&serde_yaml::Value>) -> Result<u16, String> {
    let value = value.ok_or_else(|| "missing 'port'".to_string())?;
    let port = match value {
        serde_yaml::Value::Number(n) => n.as_u64(),
        serde_yaml::Value::String(s) => s.trim().parse::<u64>().ok(),
        serde_yaml::Value::Null => return Err("missing 'port'".to_string()),
        _ => None,
    };
    match port {
        Some(p) if (1..=u16::MAX as u64).contains(&p) => Ok(p as u16),
        _ => Err(format!("invalid port {:?}", value)),
    }
}

/// A single entry that failed validation
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{collection}[{index}] '{name}': {reason}")]
pub struct DefinitionError {
    pub collection: Collection,
    pub index: usize,
    pub name: String,
    pub reason: String,
}

/// Errors that can occur when loading a service file
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Service file not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("Failed to read service file '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse service file: {0}")]
    Parse(#[from] serde_yaml::Error),
}
