use clap::Parser;
use tracing_subscriber::EnvFilter;

use portfolio::cli::Args;
use portfolio::config::RelayConfig;
use portfolio::web;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let filter = match &args.log_filter {
        Some(directive) => EnvFilter::try_new(directive)?,
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = RelayConfig::load(&args)?;
    web::serve(config).await?;

    Ok(())
}
