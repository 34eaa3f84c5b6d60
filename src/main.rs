use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use memory_bank::{cli, config, server};

#[derive(Parser)]
#[command(name = "memory-bank", version, about = "Branch-scoped memory bank server for AI agents")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start the server on the configured transport (stdio by default)
    Serve,
    /// Start the server on HTTP
    ServeHttp {
        /// Address to bind
        #[arg(long)]
        host: Option<String>,
        /// Port to bind
        #[arg(long)]
        port: Option<u16>,
    },
    /// Export one branch as a JSON snapshot
    Export {
        #[arg(long)]
        repository: String,
        #[arg(long)]
        branch: Option<String>,
        /// Output file (defaults to stdout)
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Import a JSON snapshot into one branch
    Import {
        /// Snapshot file produced by `export`
        file: PathBuf,
        #[arg(long)]
        repository: String,
        #[arg(long)]
        branch: Option<String>,
    },
    /// Show node and edge counts for one branch
    Stats {
        #[arg(long)]
        repository: String,
        #[arg(long)]
        branch: Option<String>,
    },
    /// Check database health
    Doctor,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = config::BankConfig::load()?;

    // Log to stderr so stdout stays clean for stdio JSON-RPC.
    let filter =
        EnvFilter::try_new(&config.server.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Command::Serve => server::serve(config).await?,
        Command::ServeHttp { host, port } => {
            if let Some(host) = host {
                config.server.host = host;
            }
            if let Some(port) = port {
                config.server.port = port;
            }
            server::serve_http(config).await?;
        }
        Command::Export {
            repository,
            branch,
            out,
        } => cli::export::export(&config, &repository, branch.as_deref(), out.as_deref())?,
        Command::Import {
            file,
            repository,
            branch,
        } => cli::import::import(&config, &file, &repository, branch.as_deref())?,
        Command::Stats { repository, branch } => {
            cli::stats::stats(&config, &repository, branch.as_deref())?
        }
        Command::Doctor => cli::doctor::doctor(&config)?,
    }

    Ok(())
}
