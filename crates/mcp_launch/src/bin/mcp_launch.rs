//! MCP Launch CLI
//!
//! Usage:
//!   mcp_launch                          # start every enabled adapter
//!   mcp_launch -c my_config.yaml run    # use another service file
//!   mcp_launch list                     # show configured adapters
//!   mcp_launch list --commands -f json  # include bridge command lines
//!   mcp_launch validate                 # check the service file

use mcp_launch::{
    BridgeCommand, Catalog, Command, CommandContext, LaunchArgs, ListArgs, MonitorConfig,
    OutputFormat, RunArgs, ServiceFile, StdoutSink, Supervisor, SupervisorConfig,
};
use std::sync::Arc;

#[tokio::main]
async fn main() {
    let args: LaunchArgs = argh::from_env();

    // Initialize logging
    let env = env_logger::Env::default().default_filter_or(args.log_filter());
    env_logger::init_from_env(env);

    let command = args
        .command
        .unwrap_or_else(|| Command::Run(RunArgs::default()));

    // Load service file
    log::info!("Loading service file: {}", args.config);
    let file = match ServiceFile::from_file(&args.config) {
        Ok(file) => file,
        Err(e) => {
            log::error!("{}", e);
            std::process::exit(1);
        }
    };
    let catalog = file.validate();
    for rejected in &catalog.rejected {
        log::error!("Skipping invalid entry {}", rejected);
    }

    match command {
        Command::Validate(_) => validate(&args.config, &catalog),
        Command::List(list_args) => list(catalog, list_args),
        Command::Run(run_args) => run(catalog, run_args).await,
    }
}

fn validate(path: &str, catalog: &Catalog) {
    println!("Service file '{}'", path);
    println!("  Enabled: {}", catalog.enabled().count());
    println!("  Disabled: {}", catalog.disabled_count());
    println!("  Rejected: {}", catalog.rejected.len());
    if !catalog.rejected.is_empty() {
        std::process::exit(1);
    }
}

fn list(catalog: Catalog, args: ListArgs) {
    let context = CommandContext::from_env(BridgeCommand::detect(), catalog.base_dir.clone());
    let supervisor = Supervisor::new(
        catalog,
        context,
        SupervisorConfig::default(),
        Arc::new(StdoutSink::new()),
    );
    let plan = supervisor.plan().with_commands(args.commands);

    let rendered = match args.format {
        OutputFormat::Table => Ok(plan.to_string()),
        OutputFormat::Json => serde_json::to_string_pretty(&plan).map_err(|e| e.to_string()),
        OutputFormat::Yaml => serde_yaml::to_string(&plan).map_err(|e| e.to_string()),
    };
    match rendered {
        Ok(text) => println!("{}", text),
        Err(e) => {
            log::error!("Failed to render service list: {}", e);
            std::process::exit(1);
        }
    }
}

async fn run(catalog: Catalog, args: RunArgs) {
    let context = CommandContext::from_env(BridgeCommand::detect(), catalog.base_dir.clone());
    let config = SupervisorConfig {
        monitor: MonitorConfig {
            settle_delay: args.settle_delay,
            poll_interval: args.poll_interval,
        },
        shutdown_timeout: args.shutdown_timeout,
    };
    let supervisor = Supervisor::new(catalog, context, config, Arc::new(StdoutSink::new()));

    if let Err(e) = supervisor.coordinator().install_signal_handler() {
        log::error!("Failed to install signal handler: {}", e);
        std::process::exit(1);
    }

    let summary = supervisor.run().await;
    if !summary.failed.is_empty() {
        log::warn!("Could not confirm shutdown of: {}", summary.failed.join(", "));
    }

    log::info!("MCP launcher exiting");
}
