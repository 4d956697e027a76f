mod cli;

use clap::Parser;
use cli::{Cli, Commands};
use vaultforge_worker::api;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve(args) => api::run(args.address, args.config).await?,
    }

    Ok(())
}
