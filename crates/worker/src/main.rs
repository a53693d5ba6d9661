use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde_json::{json, Value};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use docforge_core::{
    builtin_registry, load_config, load_env_config, validate_config, Config, ConverterRegistry,
    MemoryJobRepository, ProcessExecutor, ToolLocator,
};

mod dispatch;
mod paths;
mod watch;

use dispatch::{Dispatcher, Submission};
use watch::InboxWatcher;

/// Config file picked up from the working directory when none is given.
const DEFAULT_CONFIG_FILE: &str = "docforge.toml";

#[derive(Debug, Parser)]
#[command(name = "docforge", version, about = "Single-node document and media conversion worker")]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(long, short, global = true)]
    config: Option<PathBuf>,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Convert one file and print the job result as JSON
    Convert {
        /// File to convert
        input: PathBuf,

        /// Converter id; chosen by input extension when omitted
        #[arg(long)]
        converter: Option<String>,

        /// Output path; defaults to a timestamped file in storage.output_dir
        #[arg(long, short)]
        output: Option<PathBuf>,

        /// Converter parameter as key=value (value parsed as JSON when possible)
        #[arg(long = "param", value_parser = parse_param)]
        params: Vec<(String, Value)>,
    },
    /// List converters and the status of their external tools
    Check,
    /// Convert files dropped into an inbox and expire old jobs until interrupted
    Watch {
        /// Directory to poll; defaults to storage.inbox_dir
        #[arg(long)]
        inbox: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.json_logs);

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            error!("Fatal error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn init_logging(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into());
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

async fn run(cli: Cli) -> Result<ExitCode> {
    let config = resolve_config(cli.config.as_deref())?;
    validate_config(&config).context("Configuration validation failed")?;
    if config.orchestrator.dry_run {
        warn!("Dry-run mode enabled, external tools will not be invoked");
    }

    let executor = ProcessExecutor::new(config.executor.clone());
    let locator = ToolLocator::new(executor, config.converters.tool_paths.clone());
    let registry = Arc::new(
        builtin_registry(&config.converters, locator)
            .context("Failed to build converter registry")?,
    );
    let dispatcher = Dispatcher::new(
        Arc::clone(&registry),
        Arc::new(MemoryJobRepository::new()),
        config.orchestrator.clone(),
        config.storage.output_dir.clone(),
    );

    match cli.command {
        Command::Convert {
            input,
            converter,
            output,
            params,
        } => {
            let submission = Submission {
                input,
                converter,
                output,
                params: params.into_iter().collect(),
            };
            convert(&dispatcher, submission).await
        }
        Command::Check => check(&registry).await,
        Command::Watch { inbox } => {
            let inbox = inbox.unwrap_or_else(|| config.storage.inbox_dir.clone());
            let watcher = InboxWatcher::new(
                inbox,
                config.storage.poll_interval(),
                dispatcher,
                config.sweep.clone(),
            );
            watcher.run(cancel_on_shutdown()).await?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn resolve_config(explicit: Option<&Path>) -> Result<Config> {
    let path = explicit
        .map(Path::to_path_buf)
        .or_else(|| std::env::var("DOCFORGE_CONFIG").ok().map(PathBuf::from))
        .or_else(|| {
            let default = PathBuf::from(DEFAULT_CONFIG_FILE);
            default.exists().then_some(default)
        });

    match path {
        Some(path) => {
            info!("Loading configuration from {:?}", path);
            load_config(&path).with_context(|| format!("Failed to load config from {:?}", path))
        }
        None => {
            info!("No configuration file, using defaults and environment");
            load_env_config().context("Failed to load configuration from environment")
        }
    }
}

async fn convert(dispatcher: &Dispatcher, submission: Submission) -> Result<ExitCode> {
    let result = dispatcher.submit(submission, cancel_on_shutdown()).await?;

    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(if result.is_completed() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

/// Token cancelled on Ctrl+C or SIGTERM.
fn cancel_on_shutdown() -> CancellationToken {
    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            shutdown_signal().await;
            warn!("Shutdown signal received, cancelling");
            cancel.cancel();
        }
    });
    cancel
}

async fn check(registry: &ConverterRegistry) -> Result<ExitCode> {
    let mut report = Vec::with_capacity(registry.len());
    for descriptor in registry.all() {
        let status = descriptor.check_dependencies().await;
        report.push(json!({
            "id": descriptor.id(),
            "name": descriptor.name(),
            "inputs": descriptor.supported_input_extensions(),
            "outputs": descriptor.output_types(),
            "dependency": status,
        }));
    }
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(ExitCode::SUCCESS)
}

fn parse_param(raw: &str) -> Result<(String, Value), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got '{}'", raw))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("empty parameter name in '{}'", raw));
    }
    let value = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
    Ok((key.to_string(), value))
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
