//! Content identifier normalization.
//!
//! Raw IDs arrive in several external schemes (IMDb, TMDB, TVDB, Kitsu,
//! AniList, MyAnimeList, AniDB) and may carry trailing season/episode
//! segments. Normalization is pure and deterministic: the same raw ID always
//! produces the same canonical lookup key.

use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::errors::ResolveError;

static IMDB_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^tt\d+$").expect("valid IMDb pattern"));

/// Content classification driving provider selection and cache TTLs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
    Movie,
    Series,
    Anime,
}

impl ContentType {
    /// Lowercase name used in cache keys and remote API paths.
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentType::Movie => "movie",
            ContentType::Series => "series",
            ContentType::Anime => "anime",
        }
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContentType {
    type Err = ResolveError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "movie" => Ok(ContentType::Movie),
            "series" | "tv" => Ok(ContentType::Series),
            "anime" => Ok(ContentType::Anime),
            other => Err(ResolveError::InvalidIdentifier {
                raw: other.to_string(),
                reason: "unknown content type".to_string(),
            }),
        }
    }
}

/// External identifier scheme.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IdScheme {
    Imdb,
    Tmdb,
    Tvdb,
    Kitsu,
    Anilist,
    Mal,
    Anidb,
}

impl IdScheme {
    /// Prefix used in composite IDs and canonical forms.
    pub fn as_str(&self) -> &'static str {
        match self {
            IdScheme::Imdb => "imdb",
            IdScheme::Tmdb => "tmdb",
            IdScheme::Tvdb => "tvdb",
            IdScheme::Kitsu => "kitsu",
            IdScheme::Anilist => "anilist",
            IdScheme::Mal => "mal",
            IdScheme::Anidb => "anidb",
        }
    }

    fn from_prefix(prefix: &str) -> Option<Self> {
        match prefix {
            "tmdb" => Some(IdScheme::Tmdb),
            "tvdb" => Some(IdScheme::Tvdb),
            "kitsu" => Some(IdScheme::Kitsu),
            "anilist" => Some(IdScheme::Anilist),
            "mal" => Some(IdScheme::Mal),
            "anidb" => Some(IdScheme::Anidb),
            _ => None,
        }
    }

    /// Scheme assumed for bare numeric IDs of the given content type.
    fn default_for(content_type: ContentType) -> Self {
        match content_type {
            ContentType::Anime => IdScheme::Kitsu,
            ContentType::Movie | ContentType::Series => IdScheme::Tmdb,
        }
    }
}

impl fmt::Display for IdScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A normalized content lookup request. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentQuery {
    /// The identifier exactly as received
    pub raw_id: String,
    /// Stable lookup key: `tt…` for IMDb, `scheme:key` otherwise
    pub canonical_id: String,
    /// Detected identifier scheme
    pub scheme: IdScheme,
    /// Content classification
    pub content_type: ContentType,
    /// Season number when the ID addressed a specific episode
    pub season: Option<u32>,
    /// Episode number when the ID addressed a specific episode
    pub episode: Option<u32>,
}

impl ContentQuery {
    /// Cache key covering everything that distinguishes one lookup from another.
    pub fn cache_key(&self) -> String {
        match (self.season, self.episode) {
            (Some(season), Some(episode)) => format!(
                "{}:{}:{}:{}",
                self.canonical_id,
                self.content_type.as_str(),
                season,
                episode
            ),
            _ => format!("{}:{}", self.canonical_id, self.content_type.as_str()),
        }
    }
}

fn parse_numeric(segment: &str) -> Option<u32> {
    if segment.is_empty() || !segment.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    segment.parse().ok()
}

/// Splits a trailing `…:season:episode` pair off a list of key segments.
///
/// Both trailing segments must parse as integers; otherwise they stay part
/// of the key (Kitsu slugs may legitimately contain colons).
fn split_season_episode(segments: &[&str]) -> (Vec<String>, Option<u32>, Option<u32>) {
    if segments.len() >= 3 {
        let season = parse_numeric(segments[segments.len() - 2]);
        let episode = parse_numeric(segments[segments.len() - 1]);
        if let (Some(season), Some(episode)) = (season, episode) {
            let key: Vec<String> = segments[..segments.len() - 2]
                .iter()
                .map(|s| s.to_string())
                .collect();
            return (key, Some(season), Some(episode));
        }
    }
    (segments.iter().map(|s| s.to_string()).collect(), None, None)
}

/// Normalizes a raw content identifier into a [`ContentQuery`].
///
/// Detection is pattern-first in fixed priority order: IMDb's unambiguous
/// `tt` prefix, then explicit `scheme:` prefixes, then bare numeric IDs
/// which default to the scheme implied by the content type.
///
/// # Errors
/// - `ResolveError::InvalidIdentifier` - empty input or no known scheme matched
pub fn normalize(raw_id: &str, content_type: ContentType) -> Result<ContentQuery, ResolveError> {
    let trimmed = raw_id.trim();
    if trimmed.is_empty() {
        return Err(ResolveError::InvalidIdentifier {
            raw: raw_id.to_string(),
            reason: "empty identifier".to_string(),
        });
    }

    let segments: Vec<&str> = trimmed.split(':').collect();

    // IMDb: tt1234567 or tt1234567:1:2
    if IMDB_PATTERN.is_match(segments[0]) {
        let (season, episode) = match segments.len() {
            1 => (None, None),
            3 => {
                let season = parse_numeric(segments[1]);
                let episode = parse_numeric(segments[2]);
                if season.is_none() || episode.is_none() {
                    return Err(ResolveError::InvalidIdentifier {
                        raw: raw_id.to_string(),
                        reason: "non-numeric season/episode on IMDb identifier".to_string(),
                    });
                }
                (season, episode)
            }
            _ => {
                return Err(ResolveError::InvalidIdentifier {
                    raw: raw_id.to_string(),
                    reason: "malformed IMDb identifier".to_string(),
                });
            }
        };
        return Ok(ContentQuery {
            raw_id: raw_id.to_string(),
            // IMDb canonical form omits the scheme prefix, matching the
            // external API's URL convention.
            canonical_id: segments[0].to_string(),
            scheme: IdScheme::Imdb,
            content_type,
            season,
            episode,
        });
    }

    // Explicit scheme prefix: tmdb:603, kitsu:38483:1:5, …
    if let Some(scheme) = IdScheme::from_prefix(segments[0]) {
        if segments.len() < 2 || segments[1].is_empty() {
            return Err(ResolveError::InvalidIdentifier {
                raw: raw_id.to_string(),
                reason: format!("missing key after '{}' prefix", segments[0]),
            });
        }
        let (key_segments, season, episode) = split_season_episode(&segments[1..]);
        let key = key_segments.join(":");
        return Ok(ContentQuery {
            raw_id: raw_id.to_string(),
            canonical_id: format!("{}:{}", scheme.as_str(), key),
            scheme,
            content_type,
            season,
            episode,
        });
    }

    // Bare numeric, optionally with season/episode: 38483 or 38483:1:5
    if parse_numeric(segments[0]).is_some() {
        let (key_segments, season, episode) = split_season_episode(&segments);
        if key_segments.len() == 1 {
            let scheme = IdScheme::default_for(content_type);
            return Ok(ContentQuery {
                raw_id: raw_id.to_string(),
                canonical_id: format!("{}:{}", scheme.as_str(), key_segments[0]),
                scheme,
                content_type,
                season,
                episode,
            });
        }
    }

    Err(ResolveError::InvalidIdentifier {
        raw: raw_id.to_string(),
        reason: "no known identifier scheme matched".to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_imdb_detection() {
        let query = normalize("tt0111161", ContentType::Movie).unwrap();
        assert_eq!(query.scheme, IdScheme::Imdb);
        assert_eq!(query.canonical_id, "tt0111161");
        assert_eq!(query.season, None);
        assert_eq!(query.episode, None);
    }

    #[test]
    fn test_imdb_with_season_episode() {
        let query = normalize("tt0903747:3:7", ContentType::Series).unwrap();
        assert_eq!(query.canonical_id, "tt0903747");
        assert_eq!(query.season, Some(3));
        assert_eq!(query.episode, Some(7));
    }

    #[test]
    fn test_scheme_prefixes() {
        let query = normalize("tmdb:603", ContentType::Movie).unwrap();
        assert_eq!(query.scheme, IdScheme::Tmdb);
        assert_eq!(query.canonical_id, "tmdb:603");

        let query = normalize("kitsu:38483:1:5", ContentType::Anime).unwrap();
        assert_eq!(query.scheme, IdScheme::Kitsu);
        assert_eq!(query.canonical_id, "kitsu:38483");
        assert_eq!(query.season, Some(1));
        assert_eq!(query.episode, Some(5));
    }

    #[test]
    fn test_bare_numeric_defaults_by_content_type() {
        let anime = normalize("38483", ContentType::Anime).unwrap();
        assert_eq!(anime.scheme, IdScheme::Kitsu);
        assert_eq!(anime.canonical_id, "kitsu:38483");

        let movie = normalize("603", ContentType::Movie).unwrap();
        assert_eq!(movie.scheme, IdScheme::Tmdb);
        assert_eq!(movie.canonical_id, "tmdb:603");
    }

    #[test]
    fn test_non_numeric_tail_stays_in_key() {
        let query = normalize("kitsu:one:piece", ContentType::Anime).unwrap();
        assert_eq!(query.canonical_id, "kitsu:one:piece");
        assert_eq!(query.season, None);
        assert_eq!(query.episode, None);
    }

    #[test]
    fn test_normalize_is_idempotent_over_canonical_ids() {
        let ids = [
            ("tt0111161", ContentType::Movie),
            ("tmdb:603", ContentType::Movie),
            ("kitsu:38483:1:5", ContentType::Anime),
            ("38483", ContentType::Anime),
            ("tvdb:81189", ContentType::Series),
        ];
        for (raw, content_type) in ids {
            let first = normalize(raw, content_type).unwrap();
            let second = normalize(&first.canonical_id, content_type).unwrap();
            assert_eq!(first.canonical_id, second.canonical_id, "raw: {raw}");
            assert_eq!(first.scheme, second.scheme, "raw: {raw}");
        }
    }

    #[test]
    fn test_invalid_identifiers() {
        assert!(normalize("", ContentType::Movie).is_err());
        assert!(normalize("   ", ContentType::Movie).is_err());
        assert!(normalize("not-an-id", ContentType::Movie).is_err());
        assert!(normalize("tmdb:", ContentType::Movie).is_err());
        assert!(normalize("tt12345:abc:def", ContentType::Series).is_err());
    }

    #[test]
    fn test_cache_key_includes_episode_addressing() {
        let movie = normalize("tt0111161", ContentType::Movie).unwrap();
        assert_eq!(movie.cache_key(), "tt0111161:movie");

        let episode = normalize("kitsu:38483:1:5", ContentType::Anime).unwrap();
        assert_eq!(episode.cache_key(), "kitsu:38483:anime:1:5");
    }
}
