//! p2pfaasd: the P2PFaaS node daemon.
//!
//! One process per node. It sits in front of the local FaaS backend and
//! decides, per call, whether the function runs here or on a peer:
//! - Admission queue over the FaaS backend
//! - Load table, peer prober and forwarder
//! - Discovery client with background peer list refresh
//! - Learning service socket pool
//! - REST API
//!
//! # Usage
//!
//! ```text
//! p2pfaasd run --config /etc/p2pfaas/node.toml --port 18080 --data-dir /data
//! p2pfaasd default-config > node.toml
//! ```

mod node;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use p2pfaas_core::NodeConfig;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "p2pfaasd", about = "P2PFaaS scheduler node")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the scheduler node.
    Run {
        /// TOML configuration file. Defaults apply when omitted.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Port to listen on, overriding the configuration.
        #[arg(long)]
        port: Option<u16>,

        /// Directory holding the persisted runtime configuration.
        #[arg(long)]
        data_dir: Option<PathBuf>,

        /// Emit logs as JSON lines.
        #[arg(long)]
        log_json: bool,
    },
    /// Print the default configuration as TOML.
    DefaultConfig,
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,p2pfaasd=debug,p2pfaas=debug"));
    if json {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Run {
            config,
            port,
            data_dir,
            log_json,
        } => {
            init_tracing(log_json);
            let mut config = NodeConfig::load(config.as_deref())?;
            if let Some(port) = port {
                config.listening_port = port;
            }
            if let Some(dir) = data_dir {
                config.data_path = dir;
            }
            node::run(config).await
        }
        Command::DefaultConfig => {
            print!("{}", NodeConfig::default().to_toml_string()?);
            Ok(())
        }
    }
}
