//! Magnet record data model.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

static MAGNET_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^magnet:\?xt=urn:btih:[0-9a-fA-F]{40}(&.*)?$").expect("valid magnet pattern")
});

/// Video quality ladder used for ranking.
///
/// Ordered worst-to-best so the derived `Ord` matches the ranking ladder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Quality {
    #[serde(rename = "unknown")]
    Unknown,
    #[serde(rename = "360p")]
    P360,
    #[serde(rename = "480p")]
    P480,
    #[serde(rename = "720p")]
    P720,
    #[serde(rename = "1080p")]
    P1080,
    #[serde(rename = "4k")]
    FourK,
}

impl Quality {
    /// Numeric rank on the fixed priority ladder: 4K > 1080p > 720p > 480p > 360p > unknown.
    pub fn rank(&self) -> u32 {
        match self {
            Quality::Unknown => 0,
            Quality::P360 => 1,
            Quality::P480 => 2,
            Quality::P720 => 3,
            Quality::P1080 => 4,
            Quality::FourK => 5,
        }
    }

    /// Detects quality from a release name.
    pub fn detect(name: &str) -> Quality {
        let upper = name.to_uppercase();
        if upper.contains("2160P") || upper.contains("4K") || upper.contains("UHD") {
            Quality::FourK
        } else if upper.contains("1080P") {
            Quality::P1080
        } else if upper.contains("720P") {
            Quality::P720
        } else if upper.contains("480P") {
            Quality::P480
        } else if upper.contains("360P") {
            Quality::P360
        } else {
            Quality::Unknown
        }
    }

    /// Parses a CSV/config label such as `1080p` or `4k`.
    pub fn from_label(label: &str) -> Quality {
        match label.trim().to_lowercase().as_str() {
            "4k" | "2160p" => Quality::FourK,
            "1080p" => Quality::P1080,
            "720p" => Quality::P720,
            "480p" => Quality::P480,
            "360p" => Quality::P360,
            _ => Quality::Unknown,
        }
    }

    /// Label used in CSV rows and display output.
    pub fn as_label(&self) -> &'static str {
        match self {
            Quality::FourK => "4k",
            Quality::P1080 => "1080p",
            Quality::P720 => "720p",
            Quality::P480 => "480p",
            Quality::P360 => "360p",
            Quality::Unknown => "unknown",
        }
    }
}

/// A downloadable torrent record for a piece of content.
///
/// Value object: immutable after construction, only filtered and re-ranked
/// into new collections.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MagnetRecord {
    /// Canonical content ID this record belongs to
    pub content_id: String,
    /// Release name
    pub name: String,
    /// Full magnet URI with a 40-hex-char btih info hash
    pub magnet_uri: String,
    /// Detected or declared video quality
    pub quality: Quality,
    /// Payload size in bytes
    pub size_bytes: u64,
    /// Tracker/indexer the record came from
    pub provider: String,
    /// Reported seeder count
    pub seeders: u32,
    /// Reported peer count
    pub peers: u32,
    /// Season number for episodic content
    pub season: Option<u32>,
    /// Episode number for episodic content
    pub episode: Option<u32>,
    /// Identifier scheme the source keyed this record by (e.g. `imdb`, `kitsu`)
    pub source_id_type: String,
}

impl MagnetRecord {
    /// Whether this record is downloadable at all. Zero-seed magnets are
    /// operationally useless and must never reach a caller or the cache.
    pub fn is_seeded(&self) -> bool {
        self.seeders > 0
    }

    /// Dedupe fingerprint: cheap composite, not a cryptographic hash.
    pub fn fingerprint(&self) -> (String, String, u64) {
        (self.provider.clone(), self.name.clone(), self.size_bytes)
    }

    /// Format payload size in human-readable form.
    pub fn format_size(&self) -> String {
        const GB: u64 = 1024 * 1024 * 1024;
        const MB: u64 = 1024 * 1024;

        if self.size_bytes >= GB {
            format!("{:.1} GB", self.size_bytes as f64 / GB as f64)
        } else if self.size_bytes >= MB {
            format!("{:.1} MB", self.size_bytes as f64 / MB as f64)
        } else {
            format!("{:.1} KB", self.size_bytes as f64 / 1024.0)
        }
    }
}

/// Validates a magnet URI: `magnet:?xt=urn:btih:` followed by a 40-hex-char
/// info hash. Records failing this check are rejected at ingestion.
pub fn magnet_uri_is_valid(uri: &str) -> bool {
    MAGNET_PATTERN.is_match(uri)
}
