// SolarScan Command Line Interface
// Serve the detector, run single or batch predictions, manage weights and config

use clap::{Parser, Subcommand};
use solarscan_core::{SampleId, SolarScanConfig};
use solarscan_eye::batch::BatchRunner;
use solarscan_eye::models::ModelManager;
use solarscan_eye::OutputPaths;
use solarscan_server::{startup, telemetry};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

#[derive(Parser)]
#[command(name = "solarscan")]
#[command(about = "SolarScan - rooftop solar panel detection from aerial imagery", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file (JSON, TOML or YAML)
    #[arg(long, short, global = true)]
    config: Option<PathBuf>,

    #[arg(long, short, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP server
    Serve {
        #[arg(long)]
        host: Option<String>,

        #[arg(long, short)]
        port: Option<u16>,
    },

    /// Predict a single coordinate and print the record
    Predict {
        #[arg(long, allow_hyphen_values = true)]
        lat: f64,

        #[arg(long, allow_hyphen_values = true)]
        lon: f64,

        #[arg(long, default_value = "1")]
        sample_id: String,

        /// Directory for the tile and overlay images
        #[arg(long)]
        output_dir: Option<PathBuf>,
    },

    /// Run predictions over a CSV or Excel spreadsheet
    Batch {
        input: PathBuf,

        #[arg(long)]
        output_dir: Option<PathBuf>,

        #[arg(long)]
        concurrency: Option<usize>,
    },

    /// Download detector weights
    DownloadModel {
        /// HTTPS URL of the ONNX weights
        #[arg(long)]
        url: Option<String>,

        /// Expected SHA-256 of the weights
        #[arg(long)]
        checksum: Option<String>,
    },

    /// Configuration management
    #[command(subcommand)]
    Config(ConfigCommands),
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Print the effective configuration
    Show {
        /// Output format (toml, json, yaml)
        #[arg(long, default_value = "toml")]
        format: String,
    },

    /// Check the configuration for errors
    Validate,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = startup::load_config(cli.config.as_deref())?;
    if cli.verbose {
        config.logging.level = "debug".to_string();
    }
    if cli.json_logs {
        config.logging.json = true;
    }
    telemetry::init_tracing(&config.logging);

    match cli.command {
        Commands::Serve { host, port } => {
            if let Some(host) = host {
                config.server.bind_address = host;
            }
            if let Some(port) = port {
                config.server.bind_port = port;
            }
            startup::serve(config).await?;
        }
        Commands::Predict { lat, lon, sample_id, output_dir } => {
            predict(config, lat, lon, &sample_id, output_dir).await?;
        }
        Commands::Batch { input, output_dir, concurrency } => {
            run_batch(config, &input, output_dir, concurrency).await?;
        }
        Commands::DownloadModel { url, checksum } => {
            download_model(config, url, checksum).await?;
        }
        Commands::Config(cmd) => {
            handle_config_command(&config, cmd)?;
        }
    }

    Ok(())
}

async fn predict(
    config: SolarScanConfig,
    lat: f64,
    lon: f64,
    sample_id: &str,
    output_dir: Option<PathBuf>,
) -> anyhow::Result<()> {
    config.validate()?;
    let output_dir = output_dir.unwrap_or_else(|| config.server.outputs_dir.clone());
    let tile_size = config.tiles.tile_size;
    let pipeline = startup::build_pipeline(Arc::new(config)).await?;

    let sample_id = SampleId::parse(sample_id).unwrap_or(SampleId::Number(1));
    let paths = OutputPaths::for_request(&output_dir);
    let record = pipeline.run_single(sample_id, lat, lon, &paths, tile_size).await?;

    println!("{}", serde_json::to_string_pretty(&record)?);
    Ok(())
}

async fn run_batch(
    mut config: SolarScanConfig,
    input: &Path,
    output_dir: Option<PathBuf>,
    concurrency: Option<usize>,
) -> anyhow::Result<()> {
    if let Some(dir) = output_dir {
        config.batch.output_dir = dir;
    }
    if let Some(concurrency) = concurrency {
        config.batch.concurrency = concurrency;
    }
    config.validate()?;

    let pipeline = startup::build_pipeline(Arc::new(config)).await?;
    let summary = BatchRunner::new(&pipeline).run_file(input).await?;

    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

async fn download_model(
    mut config: SolarScanConfig,
    url: Option<String>,
    checksum: Option<String>,
) -> anyhow::Result<()> {
    if url.is_some() {
        config.detector.model_url = url;
    }
    if checksum.is_some() {
        config.detector.model_checksum = checksum;
    }

    let manager = ModelManager::new(&config.detector);
    let path = manager.ensure_model().await?;
    info!("✅ Detector weights ready");
    println!("{}", path.display());
    Ok(())
}

fn handle_config_command(config: &SolarScanConfig, cmd: ConfigCommands) -> anyhow::Result<()> {
    match cmd {
        ConfigCommands::Show { format } => {
            let rendered = match format.to_ascii_lowercase().as_str() {
                "json" => serde_json::to_string_pretty(config)?,
                "yaml" | "yml" => serde_yaml::to_string(config)?,
                "toml" => toml::to_string_pretty(config)?,
                other => anyhow::bail!("Unknown format '{}' (expected toml, json or yaml)", other),
            };
            println!("{}", rendered);
        }
        ConfigCommands::Validate => {
            config.validate()?;
            println!("✅ Configuration is valid");
        }
    }
    Ok(())
}
