//! Cluster connector binary

use clap::Parser;

use connector::Cli;
use connector_common::telemetry::{init_telemetry, TelemetryConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Install crypto provider before any TLS client (kube, reqwest) is built
    if let Err(e) = rustls::crypto::aws_lc_rs::default_provider().install_default() {
        eprintln!("CRITICAL: Failed to install crypto provider: {:?}", e);
        std::process::exit(1);
    }

    let cli = Cli::parse();

    let service_name = match cli.command {
        connector::Commands::Init(_) => "connector-init",
        connector::Commands::Server(_) => "connector-server",
    };
    init_telemetry(TelemetryConfig {
        service_name: service_name.to_string(),
        format: cli.log_format,
    })?;

    if let Err(e) = cli.run().await {
        tracing::error!(error = ?e, "Connector failed");
        return Err(e);
    }
    Ok(())
}
