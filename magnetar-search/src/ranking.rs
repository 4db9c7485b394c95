//! Deduplication and ranking of candidate magnet records.

use std::collections::HashSet;
use std::str::FromStr;

use magnetar_core::errors::ResolveError;
use magnetar_core::magnet::MagnetRecord;

/// Configurable ranking function applied to the deduplicated candidate set.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SelectionStrategy {
    /// Sort descending by seeder count
    Seeders,
    /// Sort by the fixed quality-priority ladder
    Quality,
    /// Weighted score over normalized seeders and quality rank
    Balanced {
        /// Weight of the normalized seeder count
        seeders_weight: f64,
        /// Weight of the normalized quality rank
        quality_weight: f64,
    },
}

impl SelectionStrategy {
    /// Balanced strategy with the default 70/30 weights.
    pub fn balanced() -> Self {
        SelectionStrategy::Balanced {
            seeders_weight: 0.7,
            quality_weight: 0.3,
        }
    }
}

impl Default for SelectionStrategy {
    fn default() -> Self {
        Self::balanced()
    }
}

impl FromStr for SelectionStrategy {
    type Err = ResolveError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "seeders" => Ok(SelectionStrategy::Seeders),
            "quality" => Ok(SelectionStrategy::Quality),
            "balanced" => Ok(SelectionStrategy::balanced()),
            other => Err(ResolveError::Configuration {
                reason: format!("unknown selection strategy '{other}'"),
            }),
        }
    }
}

/// Removes duplicates by the `(provider, name, size)` fingerprint, keeping
/// the first occurrence.
pub fn dedupe(records: Vec<MagnetRecord>) -> Vec<MagnetRecord> {
    let mut seen = HashSet::new();
    records
        .into_iter()
        .filter(|record| seen.insert(record.fingerprint()))
        .collect()
}

/// Ranks records with the given strategy. Stable sorts keep ties in input
/// order, so the result is deterministic for any input.
pub fn rank(strategy: SelectionStrategy, mut records: Vec<MagnetRecord>) -> Vec<MagnetRecord> {
    match strategy {
        SelectionStrategy::Seeders => {
            records.sort_by(|a, b| b.seeders.cmp(&a.seeders));
        }
        SelectionStrategy::Quality => {
            records.sort_by(|a, b| b.quality.rank().cmp(&a.quality.rank()));
        }
        SelectionStrategy::Balanced {
            seeders_weight,
            quality_weight,
        } => {
            let max_seeders = records
                .iter()
                .map(|record| record.seeders)
                .max()
                .unwrap_or(0)
                .max(1) as f64;
            let score = |record: &MagnetRecord| {
                seeders_weight * (record.seeders as f64 / max_seeders)
                    + quality_weight * (record.quality.rank() as f64 / 5.0)
            };
            records.sort_by(|a, b| score(b).total_cmp(&score(a)));
        }
    }
    records
}

#[cfg(test)]
mod tests {
    use magnetar_core::magnet::Quality;

    use super::*;

    fn record(name: &str, provider: &str, quality: Quality, seeders: u32, size: u64) -> MagnetRecord {
        MagnetRecord {
            content_id: "tt0111161".to_string(),
            name: name.to_string(),
            magnet_uri: format!("magnet:?xt=urn:btih:{}", "a".repeat(40)),
            quality,
            size_bytes: size,
            provider: provider.to_string(),
            seeders,
            peers: 0,
            season: None,
            episode: None,
            source_id_type: "imdb".to_string(),
        }
    }

    #[test]
    fn test_dedupe_by_provider_name_size() {
        let records = vec![
            record("A.1080p", "x", Quality::P1080, 10, 100),
            record("A.1080p", "x", Quality::P1080, 99, 100), // same fingerprint
            record("A.1080p", "y", Quality::P1080, 10, 100), // different provider
            record("A.1080p", "x", Quality::P1080, 10, 200), // different size
        ];
        let deduped = dedupe(records);
        assert_eq!(deduped.len(), 3);
        // First occurrence wins.
        assert_eq!(deduped[0].seeders, 10);
    }

    #[test]
    fn test_seeders_strategy_orders_descending() {
        let ranked = rank(
            SelectionStrategy::Seeders,
            vec![
                record("low", "x", Quality::FourK, 2, 1),
                record("high", "x", Quality::P360, 80, 1),
                record("mid", "x", Quality::P1080, 40, 1),
            ],
        );
        let seeders: Vec<u32> = ranked.iter().map(|r| r.seeders).collect();
        assert_eq!(seeders, vec![80, 40, 2]);
    }

    #[test]
    fn test_quality_strategy_follows_ladder() {
        let ranked = rank(
            SelectionStrategy::Quality,
            vec![
                record("sd", "x", Quality::P480, 500, 1),
                record("uhd", "x", Quality::FourK, 1, 1),
                record("hd", "x", Quality::P1080, 50, 1),
                record("mystery", "x", Quality::Unknown, 900, 1),
            ],
        );
        let names: Vec<&str> = ranked.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["uhd", "hd", "sd", "mystery"]);
    }

    #[test]
    fn test_balanced_strategy_weighs_both_axes() {
        // 100 seeders at unknown quality: 0.7 * 1.0 + 0.3 * 0.0 = 0.70
        // 60 seeders at 4K:               0.7 * 0.6 + 0.3 * 1.0 = 0.72
        let ranked = rank(
            SelectionStrategy::balanced(),
            vec![
                record("seeders-only", "x", Quality::Unknown, 100, 1),
                record("good-both", "x", Quality::FourK, 60, 1),
            ],
        );
        assert_eq!(ranked[0].name, "good-both");
    }

    #[test]
    fn test_ties_are_stable() {
        let ranked = rank(
            SelectionStrategy::Seeders,
            vec![
                record("first", "x", Quality::P720, 10, 1),
                record("second", "y", Quality::P1080, 10, 2),
                record("third", "z", Quality::FourK, 10, 3),
            ],
        );
        let names: Vec<&str> = ranked.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["first", "second", "third"]);
    }

    #[test]
    fn test_ranking_never_panics_on_empty_input() {
        for strategy in [
            SelectionStrategy::Seeders,
            SelectionStrategy::Quality,
            SelectionStrategy::balanced(),
        ] {
            assert!(rank(strategy, Vec::new()).is_empty());
        }
    }

    #[test]
    fn test_strategy_parsing() {
        assert_eq!(
            "seeders".parse::<SelectionStrategy>().unwrap(),
            SelectionStrategy::Seeders
        );
        assert_eq!(
            "BALANCED".parse::<SelectionStrategy>().unwrap(),
            SelectionStrategy::balanced()
        );
        assert!("best".parse::<SelectionStrategy>().is_err());
    }
}
