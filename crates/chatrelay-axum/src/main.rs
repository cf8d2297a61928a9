//! chatrelay entry point.

use clap::Parser;
use tracing_subscriber::EnvFilter;

use chatrelay_axum::{Cli, start_server};

/// Log filter used when `RUST_LOG` is unset.
const DEFAULT_LOG_FILTER: &str = "chatrelay=info,tower_http=info";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables before anything reads them
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER)),
        )
        .init();

    let settings = Cli::parse().into_settings()?;
    start_server(settings).await
}
