//! Error types shared across the resolution pipeline.

use thiserror::Error;

/// Errors that can occur while resolving a content ID into magnet records.
///
/// Only `InvalidIdentifier`, `NotFound`, and `RemoteTimeout` are expected to
/// reach callers of the orchestrator; everything else is downgraded to an
/// empty result at the cascade boundary.
#[derive(Debug, Error)]
pub enum ResolveError {
    /// The raw content ID matched no supported scheme.
    #[error("Invalid identifier '{raw}': {reason}")]
    InvalidIdentifier {
        /// The raw identifier that failed normalization
        raw: String,
        /// Why it was rejected
        reason: String,
    },

    /// The proxy transport was constructed with `enabled = false`.
    #[error("Proxy transport is disabled")]
    ProxyDisabled,

    /// The proxy did not answer the availability probe.
    #[error("Proxy unavailable: {reason}")]
    ProxyUnavailable {
        /// Probe failure detail
        reason: String,
    },

    /// A remote search pass exceeded its deadline.
    #[error("Remote search timed out: {reason}")]
    RemoteTimeout {
        /// Which deadline fired
        reason: String,
    },

    /// Both remote search passes were exhausted without a usable response.
    #[error("Remote search unavailable: {reason}")]
    RemoteUnavailable {
        /// Last failure observed
        reason: String,
    },

    /// Every source, including the remote API, came back empty.
    #[error("No magnet records found for '{content_id}'")]
    NotFound {
        /// Canonical ID that exhausted the cascade
        content_id: String,
    },

    /// Internal cache failure. Always swallowed by the orchestrator.
    #[error("Cache error: {reason}")]
    Cache {
        /// Failure detail
        reason: String,
    },

    /// Network-level failure from the HTTP client.
    #[error("Network error: {reason}")]
    Network {
        /// Failure detail
        reason: String,
    },

    /// Malformed response body or source row.
    #[error("Parse error: {reason}")]
    Parse {
        /// Failure detail
        reason: String,
    },

    /// Invalid startup configuration.
    #[error("Configuration error: {reason}")]
    Configuration {
        /// What failed validation
        reason: String,
    },
}

impl ResolveError {
    /// Wraps a `reqwest` failure, classifying timeouts separately so retry
    /// and fallback policies can tell them apart.
    pub fn from_request(err: &reqwest::Error) -> Self {
        if err.is_timeout() {
            ResolveError::RemoteTimeout {
                reason: err.to_string(),
            }
        } else {
            ResolveError::Network {
                reason: err.to_string(),
            }
        }
    }
}
