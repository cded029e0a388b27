// SolarScan HTTP server
// Fetches aerial tiles for submitted coordinates and reports rooftop solar panels

use clap::Parser;
use solarscan_server::{startup, telemetry};
use std::path::PathBuf;
use tracing::info;

#[derive(Parser)]
#[command(name = "solarscan-server")]
#[command(about = "SolarScan rooftop solar detection server", long_about = None)]
struct Args {
    /// Configuration file (JSON, TOML or YAML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[arg(long)]
    host: Option<String>,

    #[arg(short, long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = startup::load_config(args.config.as_deref())?;
    if let Some(host) = args.host {
        config.server.bind_address = host;
    }
    if let Some(port) = args.port {
        config.server.bind_port = port;
    }

    telemetry::init_tracing(&config.logging);
    info!("🚀 Starting SolarScan server v{}...", env!("CARGO_PKG_VERSION"));

    startup::serve(config).await
}
