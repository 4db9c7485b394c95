//! Magnetar Core - Content-ID resolution primitives
//!
//! Provides the building blocks of the resolution cascade: identifier
//! normalization, the magnet record data model, the adaptive TTL cache, the
//! SOCKS proxy transport with circuit rotation, CSV-backed source
//! repositories, and configuration.

pub mod cache;
pub mod config;
pub mod errors;
pub mod identifier;
pub mod magnet;
pub mod proxy;
pub mod repository;

// Re-export main types for convenient access
pub use cache::{AdaptiveCache, CacheConfig, CacheStats, CountBasedTtl, TtlStrategy};
pub use config::{MagnetarConfig, ProviderConfig, ProviderSets, SearchConfig, SourceFilesConfig};
pub use errors::ResolveError;
pub use identifier::{ContentQuery, ContentType, IdScheme, normalize};
pub use magnet::{MagnetRecord, Quality, magnet_uri_is_valid};
pub use proxy::{ProxyConfig, ProxyState, ProxyTransport};
pub use repository::{CsvMagnetRepository, MagnetSource, SOURCE_FILE_HEADER};

/// Convenience type alias for Results with ResolveError.
pub type Result<T> = std::result::Result<T, ResolveError>;
