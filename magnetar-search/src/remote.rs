//! Remote aggregation API client with the two-pass language cascade.
//!
//! Pass 1 queries the home-language provider set; any seeded result returns
//! immediately without spending a second network round-trip. Pass 2 widens
//! to the combined provider set and may legitimately come back empty.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;

use magnetar_core::config::{ProviderSets, SearchConfig};
use magnetar_core::errors::ResolveError;
use magnetar_core::identifier::ContentQuery;
use magnetar_core::magnet::{MagnetRecord, Quality, magnet_uri_is_valid};
use magnetar_core::proxy::ProxyTransport;

/// A remote magnet search backend. Mockable in tests.
#[async_trait]
pub trait RemoteSearch: Send + Sync + std::fmt::Debug {
    /// Searches the remote API for seeded magnet records.
    ///
    /// # Errors
    /// - `ResolveError::RemoteTimeout` - the final pass exceeded its deadline
    /// - `ResolveError::RemoteUnavailable` - both passes exhausted without a
    ///   usable response
    async fn search(&self, query: &ContentQuery) -> Result<Vec<MagnetRecord>, ResolveError>;
}

/// Response body of the aggregation API: a `streams` array of magnet-bearing
/// objects.
#[derive(Debug, Deserialize)]
struct StreamsResponse {
    #[serde(default)]
    streams: Vec<RemoteStream>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RemoteStream {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    magnet: Option<String>,
    #[serde(default)]
    info_hash: Option<String>,
    #[serde(default)]
    size: Option<u64>,
    #[serde(default)]
    seeders: Option<u32>,
    #[serde(default)]
    peers: Option<u32>,
    #[serde(default)]
    provider: Option<String>,
}

/// Client for the external magnet aggregation API.
#[derive(Debug)]
pub struct RemoteSearchClient {
    config: SearchConfig,
    providers: ProviderSets,
    transport: Option<Arc<ProxyTransport>>,
    direct: reqwest::Client,
}

impl RemoteSearchClient {
    /// Creates a client. When a transport is supplied, fetches go through the
    /// proxy and fall back to direct requests only if the proxy is disabled
    /// or unavailable.
    ///
    /// # Errors
    /// - `ResolveError::Network` - the direct HTTP client could not be built
    pub fn new(
        config: SearchConfig,
        providers: ProviderSets,
        transport: Option<Arc<ProxyTransport>>,
    ) -> Result<Self, ResolveError> {
        let direct = reqwest::Client::builder()
            .timeout(config.pass_timeout)
            .build()
            .map_err(|err| ResolveError::Network {
                reason: format!("failed to build HTTP client: {err}"),
            })?;
        Ok(Self {
            config,
            providers,
            transport,
            direct,
        })
    }

    /// Builds the deterministic per-pass request URL:
    /// `{base}/{providers=…|sort=…|qualityfilter=…|limit=…[|lang=…]}/stream/{type}/{id[:s:e]}.json`
    fn build_url(&self, provider_list: &[String], query: &ContentQuery) -> String {
        let mut options = vec![
            format!("providers={}", provider_list.join(",")),
            format!("sort={}", self.config.sort),
            format!("qualityfilter={}", self.config.quality_filter),
            format!("limit={}", self.config.result_limit),
        ];
        if let Some(language) = &self.config.language {
            options.push(format!("lang={language}"));
        }

        let mut id = query.canonical_id.clone();
        if let (Some(season), Some(episode)) = (query.season, query.episode) {
            id = format!("{id}:{season}:{episode}");
        }

        format!(
            "{}/{}/stream/{}/{}.json",
            self.config.base_url.trim_end_matches('/'),
            options.join("|"),
            query.content_type.as_str(),
            urlencoding::encode(&id)
        )
    }

    async fn fetch(&self, url: &str) -> Result<reqwest::Response, ResolveError> {
        if let Some(transport) = &self.transport {
            match transport.fetch(url).await {
                Ok(response) => return Ok(response),
                Err(ResolveError::ProxyDisabled | ResolveError::ProxyUnavailable { .. }) => {
                    tracing::debug!("Proxy not usable, falling back to direct fetch");
                }
                Err(err) => return Err(err),
            }
        }
        self.direct
            .get(url)
            .send()
            .await
            .map_err(|err| ResolveError::from_request(&err))
    }

    /// One search pass against a provider set, seed-filtered.
    async fn fetch_pass(
        &self,
        provider_list: &[String],
        query: &ContentQuery,
    ) -> Result<Vec<MagnetRecord>, ResolveError> {
        let url = self.build_url(provider_list, query);
        tracing::debug!("Remote search pass: {url}");

        let response = self.fetch(&url).await?;
        if !response.status().is_success() {
            return Err(ResolveError::RemoteUnavailable {
                reason: format!("HTTP {} from remote API", response.status()),
            });
        }

        let body: StreamsResponse =
            response
                .json()
                .await
                .map_err(|err| ResolveError::Parse {
                    reason: format!("invalid streams body: {err}"),
                })?;

        Ok(seeded_records(body.streams, query))
    }
}

#[async_trait]
impl RemoteSearch for RemoteSearchClient {
    async fn search(&self, query: &ContentQuery) -> Result<Vec<MagnetRecord>, ResolveError> {
        let provider_config = self.providers.for_type(query.content_type);
        let pass_timeout = self.config.pass_timeout;

        // Pass 1: home-language providers only.
        match tokio::time::timeout(pass_timeout, self.fetch_pass(&provider_config.home, query))
            .await
        {
            Ok(Ok(records)) if !records.is_empty() => {
                tracing::debug!(
                    "Home-language pass yielded {} seeded records for {}",
                    records.len(),
                    query.canonical_id
                );
                return Ok(records);
            }
            Ok(Ok(_)) => {
                tracing::debug!(
                    "Home-language pass empty for {}, widening provider set",
                    query.canonical_id
                );
            }
            Ok(Err(err)) => {
                tracing::warn!("Home-language pass failed for {}: {err}", query.canonical_id);
            }
            Err(_) => {
                tracing::warn!(
                    "Home-language pass timed out after {pass_timeout:?} for {}",
                    query.canonical_id
                );
            }
        }

        // Pass 2: combined provider set. An empty result here is a valid,
        // non-error outcome.
        match tokio::time::timeout(pass_timeout, self.fetch_pass(&provider_config.combined, query))
            .await
        {
            Ok(Ok(records)) => Ok(records),
            // A per-request timeout inside the pass is still a pass timeout.
            Ok(Err(err @ ResolveError::RemoteTimeout { .. })) => Err(err),
            Ok(Err(err)) => Err(ResolveError::RemoteUnavailable {
                reason: format!("combined pass failed: {err}"),
            }),
            Err(_) => Err(ResolveError::RemoteTimeout {
                reason: format!("combined pass exceeded {pass_timeout:?}"),
            }),
        }
    }
}

fn seeded_records(streams: Vec<RemoteStream>, query: &ContentQuery) -> Vec<MagnetRecord> {
    streams
        .into_iter()
        .filter_map(|stream| record_from_stream(stream, query))
        .filter(MagnetRecord::is_seeded)
        .collect()
}

/// Maps one stream object into a record, deriving the magnet URI from the
/// info hash when no full URI is present. Invalid magnets are rejected here,
/// at ingestion.
fn record_from_stream(stream: RemoteStream, query: &ContentQuery) -> Option<MagnetRecord> {
    let name = stream
        .title
        .or(stream.name)
        .unwrap_or_else(|| query.canonical_id.clone());

    let magnet_uri = match stream.magnet {
        Some(uri) => uri,
        None => {
            let info_hash = stream.info_hash?;
            format!(
                "magnet:?xt=urn:btih:{info_hash}&dn={}",
                urlencoding::encode(&name)
            )
        }
    };

    if !magnet_uri_is_valid(&magnet_uri) {
        tracing::debug!("Rejecting stream with invalid magnet for {}", query.canonical_id);
        return None;
    }

    Some(MagnetRecord {
        content_id: query.canonical_id.clone(),
        quality: Quality::detect(&name),
        magnet_uri,
        size_bytes: stream.size.unwrap_or(0),
        provider: stream.provider.unwrap_or_else(|| "remote".to_string()),
        seeders: stream.seeders.unwrap_or(0),
        peers: stream.peers.unwrap_or(0),
        season: query.season,
        episode: query.episode,
        source_id_type: query.scheme.as_str().to_string(),
        name,
    })
}
