//! repartd: the repartitioner daemon.
//!
//! Single binary that assembles the repartitioner subsystems:
//! - Cache client (in-memory or RESP)
//! - Keyed table (redb)
//! - Stream runtimes running the rekey topology
//! - Health indicator
//! - HTTP API (actuator health, table lookups, ingestion, metrics)
//!
//! # Usage
//!
//! ```text
//! repartd run --config /etc/repartitioner/repartitioner.toml --port 8080
//! ```

mod standalone;

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

#[derive(Parser)]
#[command(name = "repartd", about = "Repartitioner daemon")]
struct Cli {
    /// Log output format.
    #[arg(long, value_enum, default_value = "text", global = true)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the topology and the HTTP API in this process.
    Run {
        /// Path to the TOML configuration file. Defaults apply when absent.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Port to listen on.
        #[arg(long, default_value = "8080")]
        port: u16,

        /// Directory for the keyed table when `table.path` is not set.
        #[arg(long)]
        data_dir: Option<PathBuf>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

const DEFAULT_LOG_FILTER: &str = "info,repartd=debug,repartitioner=debug";

fn init_tracing(format: LogFormat) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(DEFAULT_LOG_FILTER));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_format);

    match cli.command {
        Command::Run {
            config,
            port,
            data_dir,
        } => standalone::run(config, port, data_dir).await,
    }
}
