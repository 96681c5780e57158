//! nodewarden CLI.

mod commands;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

use commands::LogFormat;
use commands::run::RunOptions;

#[derive(Parser)]
#[command(name = "nodewarden")]
#[command(version)]
#[command(about = "Supervise an embedded clustered search node")]
struct Cli {
    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Text, global = true)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start a search node and keep it running until Ctrl+C
    Run {
        /// TOML file with node properties
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Port to bind (allocated when omitted)
        #[arg(short, long)]
        port: Option<u16>,
        /// Home directory holding data/ and logs/
        #[arg(long)]
        home: Option<PathBuf>,
        #[arg(long)]
        cluster_name: Option<String>,
        #[arg(long)]
        node_name: Option<String>,
    },
    /// Print the cluster health of a running node
    Health {
        #[arg(short, long)]
        port: u16,
        #[arg(long, default_value = nodewarden::constants::DEFAULT_HOST)]
        host: String,
        #[arg(long)]
        cluster_name: String,
    },
    /// Print a currently free local port
    FreePort,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            config,
            port,
            home,
            cluster_name,
            node_name,
        } => {
            commands::init_logging(cli.log_format);
            commands::run::execute(RunOptions {
                config,
                port,
                home,
                cluster_name,
                node_name,
            })
            .await
        },
        Commands::Health {
            port,
            host,
            cluster_name,
        } => commands::health::execute(&host, port, &cluster_name).await,
        Commands::FreePort => commands::free_port::execute(),
    }
}
