//! Cascade orchestration: cache front, ordered local sources, remote
//! fallback, dedupe and ranking.
//!
//! Errors from an individual source are caught and downgraded to "empty from
//! that source" so one bad provider cannot abort the whole cascade; only
//! exhaustion of every source is a hard failure.

use std::sync::Arc;
use std::time::Duration;

use magnetar_core::cache::AdaptiveCache;
use magnetar_core::config::MagnetarConfig;
use magnetar_core::errors::ResolveError;
use magnetar_core::identifier::{ContentQuery, ContentType, normalize};
use magnetar_core::magnet::MagnetRecord;
use magnetar_core::proxy::ProxyTransport;
use magnetar_core::repository::{CsvMagnetRepository, MagnetSource};

use crate::ranking::{SelectionStrategy, dedupe, rank};
use crate::remote::{RemoteSearch, RemoteSearchClient};

/// Resolves content IDs into ranked magnet records through the source
/// cascade. All collaborators are injected; there is no hidden shared state.
#[derive(Debug)]
pub struct CascadeOrchestrator {
    sources: Vec<Arc<dyn MagnetSource>>,
    anime_source: Option<Arc<dyn MagnetSource>>,
    remote: Arc<dyn RemoteSearch>,
    cache: AdaptiveCache<Vec<MagnetRecord>>,
    strategy: SelectionStrategy,
}

impl CascadeOrchestrator {
    /// Creates an orchestrator with no local sources; add them with
    /// [`with_source`](Self::with_source) in priority order.
    pub fn new(
        cache: AdaptiveCache<Vec<MagnetRecord>>,
        remote: Arc<dyn RemoteSearch>,
        strategy: SelectionStrategy,
    ) -> Self {
        Self {
            sources: Vec::new(),
            anime_source: None,
            remote,
            cache,
            strategy,
        }
    }

    /// Appends a local source to the cascade. Sources are tried in the order
    /// they were added.
    #[must_use]
    pub fn with_source(mut self, source: Arc<dyn MagnetSource>) -> Self {
        self.sources.push(source);
        self
    }

    /// Sets the anime-specific source, consulted after the general sources
    /// and only for anime queries.
    #[must_use]
    pub fn with_anime_source(mut self, source: Arc<dyn MagnetSource>) -> Self {
        self.anime_source = Some(source);
        self
    }

    /// Wires up the full production cascade from configuration: CSV
    /// repositories, proxy transport, remote client, adaptive cache.
    ///
    /// # Errors
    /// - `ResolveError::Configuration` - invalid provider lists or bounds
    /// - `ResolveError::ProxyUnavailable` - proxied client could not be built
    /// - `ResolveError::Network` - direct HTTP client could not be built
    pub fn from_config(
        config: &MagnetarConfig,
        strategy: SelectionStrategy,
    ) -> Result<Self, ResolveError> {
        config.validate()?;

        let transport = if config.proxy.enabled {
            Some(Arc::new(ProxyTransport::new(config.proxy.clone())?))
        } else {
            None
        };
        let remote = Arc::new(RemoteSearchClient::new(
            config.search.clone(),
            config.providers.clone(),
            transport,
        )?);
        let cache = AdaptiveCache::with_defaults(config.cache.clone());

        Ok(Self::new(cache, remote, strategy)
            .with_source(Arc::new(CsvMagnetRepository::load(
                "primary",
                &config.sources.primary,
            )))
            .with_source(Arc::new(CsvMagnetRepository::load(
                "secondary",
                &config.sources.secondary,
            )))
            .with_anime_source(Arc::new(CsvMagnetRepository::load(
                "anime",
                &config.sources.anime,
            ))))
    }

    /// Resolves a raw content ID into a ranked, seed-filtered record list.
    ///
    /// # Errors
    /// - `ResolveError::InvalidIdentifier` - normalization failed
    /// - `ResolveError::NotFound` - every source, including both remote
    ///   passes, came back empty
    pub async fn resolve(
        &self,
        raw_id: &str,
        content_type: ContentType,
        season: Option<u32>,
        episode: Option<u32>,
    ) -> Result<Vec<MagnetRecord>, ResolveError> {
        let query = normalize(raw_id, content_type)?;
        // Explicit season/episode arguments take precedence over anything
        // embedded in the raw ID.
        let query = ContentQuery {
            season: season.or(query.season),
            episode: episode.or(query.episode),
            ..query
        };

        let cache_key = query.cache_key();
        if let Some(records) = self.cache.get(&cache_key).await {
            return Ok(records);
        }

        let mut collected = self.local_lookup(&query).await;
        if collected.is_empty() {
            match self.remote.search(&query).await {
                Ok(records) => collected = records,
                Err(err) => {
                    tracing::warn!(
                        "Remote search degraded to empty for {}: {err}",
                        query.canonical_id
                    );
                }
            }
        }
        collected.retain(MagnetRecord::is_seeded);

        let ranked = rank(self.strategy, dedupe(collected));
        if ranked.is_empty() {
            return Err(ResolveError::NotFound {
                content_id: query.canonical_id,
            });
        }

        if let Err(err) = self
            .cache
            .set_adaptive(cache_key, ranked.clone(), query.content_type, ranked.len())
            .await
        {
            tracing::warn!("Caching results for {} failed: {err}", query.canonical_id);
        }
        Ok(ranked)
    }

    /// Like [`resolve`](Self::resolve) but bounded by a caller deadline that
    /// covers the whole cascade, transport retries included.
    ///
    /// # Errors
    /// Same as [`resolve`](Self::resolve), plus `ResolveError::RemoteTimeout`
    /// when the deadline expires first.
    pub async fn resolve_with_deadline(
        &self,
        raw_id: &str,
        content_type: ContentType,
        season: Option<u32>,
        episode: Option<u32>,
        deadline: Duration,
    ) -> Result<Vec<MagnetRecord>, ResolveError> {
        match tokio::time::timeout(deadline, self.resolve(raw_id, content_type, season, episode))
            .await
        {
            Ok(result) => result,
            Err(_) => Err(ResolveError::RemoteTimeout {
                reason: format!("resolution exceeded {deadline:?}"),
            }),
        }
    }

    /// Cache counters, exposed for monitoring.
    pub async fn cache_stats(&self) -> magnetar_core::cache::CacheStats {
        self.cache.stats().await
    }

    /// First non-empty seed-filtered result set from the local chain.
    async fn local_lookup(&self, query: &ContentQuery) -> Vec<MagnetRecord> {
        let mut chain: Vec<&Arc<dyn MagnetSource>> = self.sources.iter().collect();
        if query.content_type == ContentType::Anime
            && let Some(anime) = &self.anime_source
        {
            chain.push(anime);
        }

        for source in chain {
            match source.lookup(query).await {
                Ok(records) => {
                    let seeded: Vec<MagnetRecord> = records
                        .into_iter()
                        .filter(MagnetRecord::is_seeded)
                        .collect();
                    if !seeded.is_empty() {
                        tracing::debug!(
                            "{} records for {} from source '{}'",
                            seeded.len(),
                            query.canonical_id,
                            source.name()
                        );
                        return seeded;
                    }
                }
                Err(err) => {
                    tracing::warn!(
                        "Source '{}' failed for {}, continuing cascade: {err}",
                        source.name(),
                        query.canonical_id
                    );
                }
            }
        }
        Vec::new()
    }
}
