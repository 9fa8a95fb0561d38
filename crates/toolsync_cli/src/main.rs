//! toolsync CLI
//!
//! Discovers the operations exposed by configured tool services, commits
//! their schemas and keeps typed TypeScript wrappers in sync with them.

#![warn(missing_docs)]
#![warn(clippy::all)]

mod prompt;
mod status;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, WrapErr};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use toolsync_sync::{RunMode, RunOptions, SyncOrchestrator, SyncReport, ToolsyncConfig, detect_ci};
use toolsync_transport::{DefaultConnector, ProcessEnv, ServiceCaller};
use tracing_subscriber::EnvFilter;

/// Exit code after an interrupt
const INTERRUPTED: i32 = 130;

/// How often idle pooled connections are reaped during a run
const REAP_INTERVAL: Duration = Duration::from_secs(30);

#[derive(Parser)]
#[command(name = "toolsync")]
#[command(about = "Keep typed tool wrappers in sync with remote tool services", long_about = None)]
struct Cli {
    /// Configuration file
    #[arg(
        short,
        long,
        global = true,
        default_value = "toolsync.json",
        env = "TOOLSYNC_CONFIG"
    )]
    config: PathBuf,

    /// Debug-level logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Introspect services, commit snapshots and regenerate wrappers
    Sync {
        /// Accept breaking changes without asking
        #[arg(short, long)]
        yes: bool,
        /// Report drift only; write nothing
        #[arg(long)]
        check: bool,
        /// Restrict to one service
        #[arg(short, long)]
        server: Option<String>,
        /// Skip services whose credential is not set
        #[arg(long)]
        skip_missing_auth: bool,
    },
    /// Show committed state without contacting any service
    Status,
    /// Call one operation on one service
    Call {
        /// Service name
        #[arg(short, long)]
        server: String,
        /// Operation name
        #[arg(short, long)]
        operation: String,
        /// Arguments as a JSON object
        #[arg(short, long, default_value = "{}")]
        args: String,
    },
}

fn init_tracing(verbose: bool, json: bool) {
    let default = if verbose { "toolsync=debug" } else { "toolsync=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn orchestrator(config: &ToolsyncConfig) -> Result<SyncOrchestrator> {
    SyncOrchestrator::from_config(config, Arc::new(ProcessEnv), Arc::new(DefaultConnector))
        .wrap_err("invalid configuration")
}

async fn run_sync(config: &ToolsyncConfig, options: RunOptions) -> Result<i32> {
    let orchestrator =
        orchestrator(config)?.with_confirmation(Arc::new(prompt::TerminalPrompt::new()));
    let reaper = orchestrator.pool().spawn_reaper(REAP_INTERVAL);

    let finished: Option<SyncReport> = tokio::select! {
        report = orchestrator.run(&options) => Some(report?),
        _ = tokio::signal::ctrl_c() => None,
    };
    reaper.abort();

    let Some(report) = finished else {
        tracing::warn!("interrupted; closing open connections");
        orchestrator.pool().close_all().await;
        return Ok(INTERRUPTED);
    };

    print!("{}", report.render());
    if report.mode == RunMode::Check && !report.drifted().is_empty() {
        println!("out of sync: {}", report.drifted().join(", "));
    }
    Ok(report.exit_code())
}

async fn run_call(
    config: &ToolsyncConfig,
    server: &str,
    operation: &str,
    args: &str,
) -> Result<i32> {
    let arguments: serde_json::Value =
        serde_json::from_str(args).wrap_err("--args must be a JSON value")?;
    let orchestrator = orchestrator(config)?;
    let service = orchestrator.service(server)?.clone();
    let credential = orchestrator.resolver().resolve(service.auth.as_ref());
    let caller = ServiceCaller::new(orchestrator.introspector().clone());

    let result = caller.call(&service, &credential, operation, arguments).await;
    orchestrator.pool().close_all().await;
    let value = result?;
    println!("{}", serde_json::to_string_pretty(&value)?);
    Ok(0)
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.json_logs);

    let config = ToolsyncConfig::load(&cli.config)
        .wrap_err_with(|| format!("failed to load {}", cli.config.display()))?;

    let code = match cli.command {
        Commands::Sync {
            yes,
            check,
            server,
            skip_missing_auth,
        } => {
            let mut options = if check {
                RunOptions::check()
            } else {
                RunOptions::sync()
            };
            if let Some(server) = server {
                options = options.with_only(server);
            }
            let options = options
                .with_assume_yes(yes)
                .with_skip_missing_auth(skip_missing_auth)
                .with_interactive(!yes && console::user_attended_stderr())
                .with_ci(detect_ci(&ProcessEnv));
            run_sync(&config, options).await?
        }
        Commands::Status => {
            print!("{}", status::render_status(&config)?);
            0
        }
        Commands::Call {
            server,
            operation,
            args,
        } => run_call(&config, &server, &operation, &args).await?,
    };

    std::process::exit(code);
}
