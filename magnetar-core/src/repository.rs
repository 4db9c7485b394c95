//! Flat-file backed magnet sources.
//!
//! Each repository builds an in-memory index once at startup from a CSV
//! side-store maintained by an external bootstrapper. A missing or invalid
//! file degrades the repository to always-empty rather than failing
//! construction: one dead source must not take the whole cascade down.

use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;

use crate::errors::ResolveError;
use crate::identifier::ContentQuery;
use crate::magnet::{MagnetRecord, Quality, magnet_uri_is_valid};

/// Exact header the bootstrapper writes. Any other header marks the file as
/// invalid; it must be repaired externally before the repository can serve it.
pub const SOURCE_FILE_HEADER: &str = "content_id,name,magnet,quality,size,source,fileIdx,filename,provider,seeders,peers,season,episode,imdb_id,id_type";

const FIELD_COUNT: usize = 15;

/// A source of magnet records for canonical content IDs.
///
/// Implemented by the CSV repositories and by the remote search client's
/// orchestrator-facing adapters; mockable in tests.
#[async_trait]
pub trait MagnetSource: Send + Sync + std::fmt::Debug {
    /// Human-readable source name for logging.
    fn name(&self) -> &str;

    /// Looks up magnet records for a normalized query. An absent ID is an
    /// empty result, not an error.
    ///
    /// # Errors
    /// - `ResolveError` - source-specific failure; downgraded to an empty
    ///   result at the cascade boundary
    async fn lookup(&self, query: &ContentQuery) -> Result<Vec<MagnetRecord>, ResolveError>;
}

/// CSV-backed in-memory magnet index.
#[derive(Debug)]
pub struct CsvMagnetRepository {
    name: String,
    index: HashMap<String, Vec<MagnetRecord>>,
}

impl CsvMagnetRepository {
    /// Loads a repository from a CSV file. Missing files and files with an
    /// unexpected header degrade to an empty repository with a warning.
    pub fn load(name: impl Into<String>, path: impl AsRef<Path>) -> Self {
        let name = name.into();
        let path = path.as_ref();

        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(err) => {
                tracing::warn!(
                    "Source file {} unreadable ({err}); '{name}' will serve no records",
                    path.display()
                );
                return Self {
                    name,
                    index: HashMap::new(),
                };
            }
        };

        let mut lines = contents.lines();
        match lines.next() {
            Some(header) if header.trim() == SOURCE_FILE_HEADER => {}
            _ => {
                tracing::warn!(
                    "Source file {} has an unexpected header; '{name}' will serve no records",
                    path.display()
                );
                return Self {
                    name,
                    index: HashMap::new(),
                };
            }
        }

        let mut index: HashMap<String, Vec<MagnetRecord>> = HashMap::new();
        let mut loaded = 0usize;
        let mut skipped = 0usize;

        for (line_number, line) in lines.enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match parse_row(line) {
                Some((record, imdb_id)) => {
                    if let Some(imdb) = imdb_id
                        && imdb != record.content_id
                    {
                        index.entry(imdb).or_default().push(record.clone());
                    }
                    index
                        .entry(record.content_id.clone())
                        .or_default()
                        .push(record);
                    loaded += 1;
                }
                None => {
                    tracing::debug!(
                        "Skipping invalid row {} in {}",
                        line_number + 2,
                        path.display()
                    );
                    skipped += 1;
                }
            }
        }

        tracing::info!(
            "Loaded {loaded} magnet records into '{name}' from {} ({skipped} skipped)",
            path.display()
        );
        Self { name, index }
    }

    /// Creates an empty repository; used when a source is configured off.
    pub fn empty(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            index: HashMap::new(),
        }
    }

    /// Number of distinct content IDs indexed.
    pub fn len(&self) -> usize {
        self.index.len()
    }

    /// Whether the index holds no records.
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    fn records_for(&self, query: &ContentQuery) -> Vec<MagnetRecord> {
        let Some(records) = self.index.get(&query.canonical_id) else {
            return Vec::new();
        };
        records
            .iter()
            .filter(|record| episode_matches(record, query))
            .cloned()
            .collect()
    }
}

/// Season/episode filter: rows without episode data are season-agnostic
/// (full-season packs) and are retained for episode queries.
fn episode_matches(record: &MagnetRecord, query: &ContentQuery) -> bool {
    match (query.season, query.episode) {
        (Some(season), Some(episode)) => {
            (record.season.is_none() && record.episode.is_none())
                || (record.season == Some(season) && record.episode == Some(episode))
        }
        _ => true,
    }
}

#[async_trait]
impl MagnetSource for CsvMagnetRepository {
    fn name(&self) -> &str {
        &self.name
    }

    async fn lookup(&self, query: &ContentQuery) -> Result<Vec<MagnetRecord>, ResolveError> {
        Ok(self.records_for(query))
    }
}

/// Quote-aware CSV field splitter. The reference corpus carries no CSV
/// crate, and the format here is a fixed 15-column contract.
fn split_fields(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '"' if in_quotes && chars.peek() == Some(&'"') => {
                field.push('"');
                chars.next();
            }
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => fields.push(std::mem::take(&mut field)),
            other => field.push(other),
        }
    }
    fields.push(field);
    fields
}

fn optional_number(field: &str) -> Option<u32> {
    let trimmed = field.trim();
    if trimmed.is_empty() {
        None
    } else {
        trimmed.parse().ok()
    }
}

/// Parses one data row into a record plus its secondary IMDb index key.
/// Returns `None` for rows that fail the column count, numeric parsing, or
/// the magnet URI invariant.
fn parse_row(line: &str) -> Option<(MagnetRecord, Option<String>)> {
    let fields = split_fields(line);
    if fields.len() != FIELD_COUNT {
        return None;
    }

    let content_id = fields[0].trim();
    let magnet_uri = fields[2].trim();
    if content_id.is_empty() || !magnet_uri_is_valid(magnet_uri) {
        return None;
    }

    let name = fields[1].trim().to_string();
    let mut quality = Quality::from_label(&fields[3]);
    if quality == Quality::Unknown {
        quality = Quality::detect(&name);
    }

    let provider = if fields[8].trim().is_empty() {
        fields[5].trim().to_string()
    } else {
        fields[8].trim().to_string()
    };

    let imdb_id = {
        let trimmed = fields[13].trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    };

    let record = MagnetRecord {
        content_id: content_id.to_string(),
        name,
        magnet_uri: magnet_uri.to_string(),
        quality,
        size_bytes: fields[4].trim().parse().unwrap_or(0),
        provider,
        seeders: fields[9].trim().parse().unwrap_or(0),
        peers: fields[10].trim().parse().unwrap_or(0),
        season: optional_number(&fields[11]),
        episode: optional_number(&fields[12]),
        source_id_type: fields[14].trim().to_string(),
    };
    Some((record, imdb_id))
}
