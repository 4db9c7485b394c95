//! Centralized configuration for Magnetar.
//!
//! All tunable parameters live here as plain values with sensible defaults
//! and environment variable overrides. No core logic depends on how these
//! are loaded.

use std::path::PathBuf;
use std::time::Duration;

use crate::cache::CacheConfig;
use crate::errors::ResolveError;
use crate::identifier::ContentType;
use crate::proxy::ProxyConfig;

/// Provider lists for one content type: a home-language set tried first and
/// a combined set (home-language unioned with general-purpose trackers) for
/// the fallback pass.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    /// Home-language trackers, queried in the first pass
    pub home: Vec<String>,
    /// Home-language plus general-purpose trackers, queried in the fallback pass
    pub combined: Vec<String>,
}

impl ProviderConfig {
    fn validate(&self, content_type: ContentType) -> Result<(), ResolveError> {
        if self.home.is_empty() || self.combined.is_empty() {
            return Err(ResolveError::Configuration {
                reason: format!("empty provider list for {content_type}"),
            });
        }
        Ok(())
    }
}

/// Per-content-type provider configuration.
#[derive(Debug, Clone)]
pub struct ProviderSets {
    pub movie: ProviderConfig,
    pub series: ProviderConfig,
    pub anime: ProviderConfig,
}

impl ProviderSets {
    /// Provider lists for the given content type.
    pub fn for_type(&self, content_type: ContentType) -> &ProviderConfig {
        match content_type {
            ContentType::Movie => &self.movie,
            ContentType::Series => &self.series,
            ContentType::Anime => &self.anime,
        }
    }
}

fn providers(names: &[&str]) -> Vec<String> {
    names.iter().map(|name| name.to_string()).collect()
}

impl Default for ProviderSets {
    fn default() -> Self {
        let home_general = ["mejortorrent", "wolfmax4k", "cinecalidad"];
        let general = ["yts", "eztv", "1337x", "thepiratebay", "rarbg"];
        let anime_general = ["nyaasi", "tokyotosho", "anidex"];

        let combined: Vec<&str> = home_general.iter().chain(&general).copied().collect();
        let anime_combined: Vec<&str> = home_general
            .iter()
            .chain(&anime_general)
            .copied()
            .collect();

        Self {
            movie: ProviderConfig {
                home: providers(&home_general),
                combined: providers(&combined),
            },
            series: ProviderConfig {
                home: providers(&home_general),
                combined: providers(&combined),
            },
            anime: ProviderConfig {
                home: providers(&["mejortorrent", "wolfmax4k"]),
                combined: providers(&anime_combined),
            },
        }
    }
}

/// Remote aggregation API parameters.
#[derive(Debug, Clone)]
pub struct SearchConfig {
    /// API base URL
    pub base_url: String,
    /// Sort order requested from the API
    pub sort: String,
    /// Quality filter expression passed through to the API
    pub quality_filter: String,
    /// Maximum results requested per pass
    pub result_limit: u32,
    /// Optional language hint encoded into the request
    pub language: Option<String>,
    /// Deadline raced against each search pass
    pub pass_timeout: Duration,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            base_url: "https://torrentio.strem.fun".to_string(),
            sort: "seeders".to_string(),
            quality_filter: "scr,cam".to_string(),
            result_limit: 20,
            language: Some("spanish".to_string()),
            pass_timeout: Duration::from_secs(30),
        }
    }
}

/// Locations of the flat-file side-stores.
#[derive(Debug, Clone)]
pub struct SourceFilesConfig {
    /// Primary store
    pub primary: PathBuf,
    /// Secondary store
    pub secondary: PathBuf,
    /// Anime-specific store, consulted only for anime queries
    pub anime: PathBuf,
}

impl Default for SourceFilesConfig {
    fn default() -> Self {
        Self {
            primary: PathBuf::from("data/magnets.csv"),
            secondary: PathBuf::from("data/magnets_extra.csv"),
            anime: PathBuf::from("data/anime_magnets.csv"),
        }
    }
}

/// Central configuration for all Magnetar components.
#[derive(Debug, Clone, Default)]
pub struct MagnetarConfig {
    pub providers: ProviderSets,
    pub proxy: ProxyConfig,
    pub cache: CacheConfig,
    pub search: SearchConfig,
    pub sources: SourceFilesConfig,
}

impl MagnetarConfig {
    /// Creates configuration with environment variable overrides.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(enabled) = std::env::var("MAGNETAR_PROXY_ENABLED") {
            config.proxy.enabled = enabled.parse().unwrap_or(false);
        }
        if let Ok(host) = std::env::var("MAGNETAR_PROXY_HOST") {
            config.proxy.host = host;
        }
        if let Ok(port) = std::env::var("MAGNETAR_PROXY_SOCKS_PORT") {
            if let Ok(port) = port.parse() {
                config.proxy.socks_port = port;
            }
        }
        if let Ok(port) = std::env::var("MAGNETAR_PROXY_CONTROL_PORT") {
            if let Ok(port) = port.parse() {
                config.proxy.control_port = port;
            }
        }
        if let Ok(retries) = std::env::var("MAGNETAR_PROXY_MAX_RETRIES") {
            if let Ok(retries) = retries.parse() {
                config.proxy.max_retries = retries;
            }
        }

        if let Ok(entries) = std::env::var("MAGNETAR_CACHE_MAX_ENTRIES") {
            if let Ok(entries) = entries.parse() {
                config.cache.max_entries = entries;
            }
        }
        if let Ok(seconds) = std::env::var("MAGNETAR_CACHE_DEFAULT_TTL") {
            if let Ok(seconds) = seconds.parse::<u64>() {
                config.cache.default_ttl = Duration::from_secs(seconds);
            }
        }

        if let Ok(base_url) = std::env::var("MAGNETAR_SEARCH_BASE_URL") {
            config.search.base_url = base_url;
        }
        if let Ok(limit) = std::env::var("MAGNETAR_SEARCH_LIMIT") {
            if let Ok(limit) = limit.parse() {
                config.search.result_limit = limit;
            }
        }
        if let Ok(seconds) = std::env::var("MAGNETAR_SEARCH_PASS_TIMEOUT") {
            if let Ok(seconds) = seconds.parse::<u64>() {
                config.search.pass_timeout = Duration::from_secs(seconds);
            }
        }

        if let Ok(path) = std::env::var("MAGNETAR_SOURCE_PRIMARY") {
            config.sources.primary = PathBuf::from(path);
        }
        if let Ok(path) = std::env::var("MAGNETAR_SOURCE_SECONDARY") {
            config.sources.secondary = PathBuf::from(path);
        }
        if let Ok(path) = std::env::var("MAGNETAR_SOURCE_ANIME") {
            config.sources.anime = PathBuf::from(path);
        }

        config
    }

    /// Creates a configuration optimized for tests: no proxy, no background
    /// tasks, a small cache.
    pub fn for_testing() -> Self {
        let mut config = Self::default();
        config.proxy.enabled = false;
        config.proxy.enable_auto_rotation = false;
        config.cache.max_entries = 100;
        config.cache.enable_sweep = false;
        config.search.pass_timeout = Duration::from_secs(2);
        config
    }

    /// Validates provider lists and bounds once at startup.
    ///
    /// # Errors
    /// - `ResolveError::Configuration` - empty provider list or zero bound
    pub fn validate(&self) -> Result<(), ResolveError> {
        self.providers.movie.validate(ContentType::Movie)?;
        self.providers.series.validate(ContentType::Series)?;
        self.providers.anime.validate(ContentType::Anime)?;

        if self.search.result_limit == 0 {
            return Err(ResolveError::Configuration {
                reason: "search result limit must be positive".to_string(),
            });
        }
        if self.proxy.max_retries == 0 {
            return Err(ResolveError::Configuration {
                reason: "proxy retry count must be positive".to_string(),
            });
        }
        if self.cache.max_entries == 0 {
            return Err(ResolveError::Configuration {
                reason: "cache capacity must be positive".to_string(),
            });
        }
        Ok(())
    }
}
