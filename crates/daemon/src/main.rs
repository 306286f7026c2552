// quired: standalone mode entry point.

use std::path::PathBuf;

use clap::Parser;
use quire_daemon::config::DaemonConfig;
use quire_daemon::startup::DaemonPaths;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "quired", version, about = "Local notebook daemon")]
struct Args {
    /// Notebook database to serve (overrides `notebook_path` in the config).
    #[arg(long)]
    notebook: Option<PathBuf>,
    /// Config file (defaults to ~/.quire/config.toml).
    #[arg(long)]
    config: Option<PathBuf>,
    /// Unix socket to listen on (defaults to ~/.quire/quired.sock).
    #[arg(long)]
    socket: Option<PathBuf>,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    let mut config = match DaemonConfig::load(args.config.as_deref()) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("quired: {err}");
            std::process::exit(1);
        }
    };

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_filter));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    if let Some(notebook) = args.notebook {
        config.notebook_path = Some(notebook);
    }

    let paths = match DaemonPaths::resolve() {
        Ok(paths) => paths,
        Err(err) => {
            error!(error = ?err, "failed to prepare runtime directory");
            std::process::exit(1);
        }
    };
    let paths = match args.socket {
        Some(socket) => paths.with_socket_path(socket),
        None => paths,
    };

    info!("starting standalone quire daemon");
    if let Err(err) = quire_daemon::runtime::run_standalone(config, paths).await {
        error!(error = ?err, "standalone daemon terminated unexpectedly");
        std::process::exit(1);
    }
}
