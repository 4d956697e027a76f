use clap::{Parser, Subcommand};
use std::net::SocketAddr;

#[derive(Parser, Debug)]
#[command(name = "vaultforge-worker")]
#[command(about = "Repository content build pipeline worker", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the HTTP job-submission service (POST /process, GET /health)
    Serve(ServeArgs),
}

#[derive(clap::Args, Debug)]
pub struct ServeArgs {
    /// Address to bind the API server to; defaults to `PORT` env var / config
    #[arg(long)]
    pub address: Option<SocketAddr>,

    /// Path to an optional TOML config file
    #[arg(long)]
    pub config: Option<String>,
}
