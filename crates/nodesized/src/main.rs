//! nodesized: the nodesize daemon.
//!
//! Polls one or more job queues, sizes each queue against the node
//! catalog, and writes the resulting demand to stdout as JSON lines for a
//! cloud-instance controller to reconcile.
//!
//! # Usage
//!
//! ```text
//! nodesized run --config /etc/nodesize/nodesize.toml
//! nodesized plan --config /etc/nodesize/nodesize.toml --queue-file queue.json
//! ```

mod daemon;
mod output;

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};

use nodesize_core::NodesizeConfig;

#[derive(Parser)]
#[command(name = "nodesized", about = "nodesize daemon")]
struct Cli {
    /// Log output format.
    #[arg(long, value_enum, default_value = "text", global = true)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Copy, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Command {
    /// Poll the configured queues and publish demand until interrupted.
    Run {
        /// Path to nodesize.toml.
        #[arg(long, default_value = "/etc/nodesize/nodesize.toml")]
        config: PathBuf,
    },
    /// Size a single queue document once and print the plan.
    Plan {
        /// Path to nodesize.toml.
        #[arg(long, default_value = "/etc/nodesize/nodesize.toml")]
        config: PathBuf,

        /// JSON queue document (array or `{"items": [...]}`).
        #[arg(long)]
        queue_file: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_format);

    match cli.command {
        Command::Run { config } => {
            let config = load_config(&config)?;
            daemon::run(config).await
        }
        Command::Plan { config, queue_file } => {
            let config = load_config(&config)?;
            daemon::plan(&config, &queue_file).await
        }
    }
}

fn init_tracing(format: LogFormat) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,nodesize=debug"));

    // Logs go to stderr; stdout carries demand output.
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

fn load_config(path: &std::path::Path) -> anyhow::Result<NodesizeConfig> {
    NodesizeConfig::from_file(path)
        .with_context(|| format!("failed to load config {}", path.display()))
}
