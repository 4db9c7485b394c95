//! Command-line front end for the magnet resolution cascade.
//!
//! All resolution logic lives in the library crates; this binary only parses
//! arguments, installs the log subscriber, and prints results.

mod commands;

use clap::Parser;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "magnetar", version)]
#[command(about = "Resolve content IDs into ranked torrent magnet links")]
struct Cli {
    #[command(subcommand)]
    command: commands::Commands,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    commands::handle_command(Cli::parse().command).await?;
    Ok(())
}
