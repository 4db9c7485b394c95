//! CLI command implementations

use std::time::Duration;

use clap::Subcommand;
use magnetar_core::config::MagnetarConfig;
use magnetar_core::identifier::ContentType;
use magnetar_core::repository::{CsvMagnetRepository, MagnetSource};
use magnetar_core::Result;
use magnetar_search::{CascadeOrchestrator, SelectionStrategy};

/// Available CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Resolve a content ID into ranked magnet links
    Resolve {
        /// Content ID (e.g. tt0111161, tmdb:550, kitsu:1376)
        id: String,
        /// Content type: movie, series or anime
        #[arg(short = 't', long = "type", default_value = "movie")]
        content_type: String,
        /// Season number for episodic content
        #[arg(short, long)]
        season: Option<u32>,
        /// Episode number for episodic content
        #[arg(short, long)]
        episode: Option<u32>,
        /// Ranking strategy: seeders, quality or balanced
        #[arg(long, default_value = "balanced")]
        strategy: String,
        /// Overall deadline in seconds
        #[arg(long, default_value = "60")]
        deadline: u64,
        /// Maximum number of results to print
        #[arg(short, long, default_value = "10")]
        limit: usize,
    },
    /// Show the configured local source files and their record counts
    Sources,
}

/// Handle the CLI command
///
/// # Errors
/// Returns appropriate error based on the command that fails
pub async fn handle_command(command: Commands) -> Result<()> {
    match command {
        Commands::Resolve {
            id,
            content_type,
            season,
            episode,
            strategy,
            deadline,
            limit,
        } => {
            resolve(
                id,
                content_type,
                season,
                episode,
                strategy,
                Duration::from_secs(deadline),
                limit,
            )
            .await
        }
        Commands::Sources => list_sources(),
    }
}

/// Resolve a content ID through the full cascade and print the results.
///
/// # Errors
/// - `ResolveError::InvalidIdentifier` - the ID or content type is malformed
/// - `ResolveError::Configuration` - environment configuration is invalid
/// - `ResolveError::NotFound` - no seeded magnet was found anywhere
async fn resolve(
    id: String,
    content_type: String,
    season: Option<u32>,
    episode: Option<u32>,
    strategy: String,
    deadline: Duration,
    limit: usize,
) -> Result<()> {
    let content_type: ContentType = content_type.parse()?;
    let strategy: SelectionStrategy = strategy.parse()?;

    let config = MagnetarConfig::from_env();
    config.validate()?;

    tracing::info!("Resolving {id} as {content_type} with {strategy:?} ranking");
    let orchestrator = CascadeOrchestrator::from_config(&config, strategy)?;
    let records = orchestrator
        .resolve_with_deadline(&id, content_type, season, episode, deadline)
        .await?;

    println!("Found {} magnet(s) for {id}:", records.len());
    for record in records.iter().take(limit) {
        println!(
            "  [{}] {} ({}, {} seeders, {})",
            record.quality.as_label(),
            record.name,
            record.provider,
            record.seeders,
            record.format_size(),
        );
        println!("    {}", record.magnet_uri);
    }

    Ok(())
}

/// Load each configured CSV store and report what it indexed.
///
/// # Errors
/// - `ResolveError::Configuration` - environment configuration is invalid
fn list_sources() -> Result<()> {
    let config = MagnetarConfig::from_env();
    config.validate()?;

    let stores = [
        ("primary", &config.sources.primary),
        ("secondary", &config.sources.secondary),
        ("anime", &config.sources.anime),
    ];
    for (name, path) in stores {
        let repo = CsvMagnetRepository::load(name, path);
        println!(
            "{}: {} ({} indexed ID(s))",
            repo.name(),
            path.display(),
            repo.len()
        );
    }

    Ok(())
}
