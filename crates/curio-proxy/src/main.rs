//! `curio-proxy` binary entrypoint.
//!
//! Configuration comes from environment variables, optionally overridden by a
//! YAML file passed with `--config`.

use clap::Parser;
use curio_proxy::{serve, GatewayConfig};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "curio-proxy")]
#[command(version, about = "OpenAI-compatible gateway for the Cursor chat backend", long_about = None)]
struct Cli {
    /// Path to a curio.yml configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Port to listen on (overrides config and PORT)
    #[arg(short, long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Respect `RUST_LOG` if set; otherwise default to info.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let mut config = match cli.config {
        Some(path) => GatewayConfig::from_yaml_file(path)?,
        None => GatewayConfig::default(),
    };
    if let Some(port) = cli.port {
        config.port = port;
    }

    serve(config).await
}
