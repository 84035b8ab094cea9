//! SECOM quality control - Main Entry Point

use clap::Parser;
use secom_qc::cli::{self, Cli};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "secom_qc=info".into()),
        )
        .init();

    let cli = Cli::parse();
    cli::run(cli).await
}
