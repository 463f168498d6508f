//! Tranqu gRPC server binary.
//!
//! ```bash
//! tranqu-server --config config/config.yaml --logging config/logging.yaml
//! ```

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tranqu_grpc::{Config, LoggingConfig};

/// Run the gRPC server with configuration files.
#[derive(Parser)]
#[command(name = "tranqu-server")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to the server configuration file (YAML format).
    #[arg(short, long, default_value = "config/config.yaml")]
    config: PathBuf,

    /// Path to the logging configuration file (YAML format).
    #[arg(short, long, default_value = "config/logging.yaml")]
    logging: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = Config::load(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;
    let logging = LoggingConfig::load(&cli.logging)
        .with_context(|| format!("loading {}", cli.logging.display()))?;

    tranqu_grpc::serve(&config, &logging).await?;

    Ok(())
}
