use anyhow::Result;
use clap::Parser;
use gallery_sync::cli::{run, Cli};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // WEASYL_API_KEY may live in a .env file next to the config
    dotenvy::dotenv().ok();

    // RUST_LOG wins; progress lines go to stdout, so keep logs at info by default.
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
    tracing::info!("gallery-sync starting: tracing initialised, environment loaded");

    let cli = Cli::parse();
    let result = run(cli).await;
    if let Err(e) = &result {
        tracing::error!(error = %e, "gallery-sync exited with error");
    }
    result
}
