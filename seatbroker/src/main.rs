//! seatbrokerd entry point.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::bail;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use seatbroker::config::Config;
use seatbroker::service::LicenseService;
use seatbroker::transport::{ServerConfig, serve};

#[derive(Debug, Parser)]
#[command(name = "seatbrokerd", about = "License seat arbitration server")]
struct Args {
    /// Path to the JSON config file defining license pools.
    #[arg(long)]
    config: PathBuf,

    /// Address to listen on.
    #[arg(long, default_value = "0.0.0.0")]
    host: String,

    /// Port to listen on.
    #[arg(long, default_value_t = 7171)]
    port: u16,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let config = Config::from_file(&args.config)?;
    if config.licenses.is_empty() {
        bail!("config defines no license pools");
    }

    let service = Arc::new(LicenseService::new(&config));
    LicenseService::spawn_background(&service);

    serve(
        ServerConfig {
            host: args.host,
            port: args.port,
        },
        service,
    )
    .await
}
