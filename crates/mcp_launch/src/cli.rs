//! Command-line interface for mcp_launch

use argh::FromArgs;
use std::time::Duration;

/// Launch and supervise MCP tool adapters behind SSE bridges
#[derive(FromArgs, Debug)]
pub struct LaunchArgs {
    /// path to the service file (default: mcp_config.yaml)
    #[argh(option, short = 'c', default = "String::from(\"mcp_config.yaml\")")]
    pub config: String,

    /// log level (error, warn, info, debug, trace)
    #[argh(option, short = 'l', default = "String::from(\"info\")")]
    pub log_level: String,

    #[argh(subcommand)]
    pub command: Option<Command>,
}

#[derive(FromArgs, Debug, PartialEq)]
#[argh(subcommand)]
pub enum Command {
    Run(RunArgs),
    List(ListArgs),
    Validate(ValidateArgs),
}

/// Start every enabled adapter and supervise until interrupted (default)
#[derive(FromArgs, Debug, PartialEq)]
#[argh(subcommand, name = "run")]
pub struct RunArgs {
    /// seconds to wait after SIGTERM before killing an adapter (default: 5)
    #[argh(option, default = "Duration::from_secs(5)", from_str_fn(parse_secs))]
    pub shutdown_timeout: Duration,

    /// seconds between health checks (default: 5)
    #[argh(option, default = "Duration::from_secs(5)", from_str_fn(parse_interval))]
    pub poll_interval: Duration,

    /// seconds to wait before the first health check (default: 2)
    #[argh(option, default = "Duration::from_secs(2)", from_str_fn(parse_secs))]
    pub settle_delay: Duration,
}

impl Default for RunArgs {
    fn default() -> Self {
        Self {
            shutdown_timeout: Duration::from_secs(5),
            poll_interval: Duration::from_secs(5),
            settle_delay: Duration::from_secs(2),
        }
    }
}

/// List configured adapters without starting anything
#[derive(FromArgs, Debug, PartialEq)]
#[argh(subcommand, name = "list")]
pub struct ListArgs {
    /// also show the composed bridge command lines
    #[argh(switch)]
    pub commands: bool,

    /// output format: table, json, yaml (default: table)
    #[argh(option, short = 'f', default = "OutputFormat::Table", from_str_fn(parse_format))]
    pub format: OutputFormat,
}

/// Validate the service file and exit
#[derive(FromArgs, Debug, PartialEq)]
#[argh(subcommand, name = "validate")]
pub struct ValidateArgs {}

/// Output format for `list`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Table,
    Json,
    Yaml,
}

/// Parse a whole number of seconds
fn parse_secs(s: &str) -> Result<Duration, String> {
    s.trim()
        .parse::<u64>()
        .map(Duration::from_secs)
        .map_err(|_| format!("Invalid number of seconds '{}'", s))
}

/// Parse a non-zero number of seconds
fn parse_interval(s: &str) -> Result<Duration, String> {
    let duration = parse_secs(s)?;
    if duration.is_zero() {
        return Err("Interval must be at least 1 second".to_string());
    }
    Ok(duration)
}

/// Parse output format name
fn parse_format(s: &str) -> Result<OutputFormat, String> {
    match s.to_lowercase().as_str() {
        "table" => Ok(OutputFormat::Table),
        "json" => Ok(OutputFormat::Json),
        "yaml" => Ok(OutputFormat::Yaml),
        _ => Err(format!(
            "Invalid format '{}'. Expected 'table', 'json' or 'yaml'",
            s
        )),
    }
}

impl LaunchArgs {
    /// Normalized log level, falling back to info
    pub fn log_filter(&self) -> &'static str {
        match self.log_level.to_lowercase().as_str() {
            "error" => "error",
            "warn" => "warn",
            "debug" => "debug",
            "trace" => "trace",
            _ => "info",
        }
    }
}
