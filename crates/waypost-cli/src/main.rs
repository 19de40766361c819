use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use waypost_audit::AuditService;
use waypost_core::WaypostConfig;

mod commands;

#[derive(Parser, Debug)]
#[command(name = "waypost", version, about = "Waypost process audit trail")]
struct Cli {
    /// Path to waypost.yaml. Defaults apply when omitted.
    #[arg(long, short, global = true, env = "WAYPOST_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List recorded processes, newest first.
    Processes(commands::processes::ListArgs),

    /// Show one process with its events.
    Show {
        /// Process (execution) id.
        id: String,
    },

    /// List the events of one process.
    Events {
        /// Process (execution) id.
        id: String,
    },

    /// Run a simulated cluster workflow through the local engine.
    Simulate(commands::simulate::SimulateArgs),

    /// Serve the audit trail over a read-only HTTP API.
    Serve {
        /// Bind address.
        #[arg(long, default_value = "127.0.0.1:8080")]
        bind: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = WaypostConfig::load_or_default(cli.config.as_deref())?;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.filter));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let service = Arc::new(AuditService::new(config.audit.clone())?);

    match cli.cmd {
        Command::Processes(args) => commands::processes::run_list(&service, &args).await?,
        Command::Show { id } => commands::processes::run_show(&service, &id).await?,
        Command::Events { id } => commands::processes::run_events(&service, &id).await?,
        Command::Simulate(args) => commands::simulate::run(service, &config, &args).await?,
        Command::Serve { bind } => commands::serve::run(service, &bind).await?,
    }

    Ok(())
}
