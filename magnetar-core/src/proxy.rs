//! Anonymizing HTTP transport through a SOCKS5 proxy.
//!
//! Hides circuit rotation and bounded retry behind a single `fetch` call.
//! The transport probes the proxy's SOCKS port before use, retries retryable
//! failures (HTTP 502, network timeouts, connection errors) after requesting
//! a fresh circuit over the proxy's control channel, and proactively rotates
//! the circuit on a fixed interval to limit long-lived-session exposure.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::RwLock;

use crate::errors::ResolveError;

/// Proxy transport configuration.
#[derive(Debug, Clone)]
pub struct ProxyConfig {
    /// Whether proxied fetching is enabled at all
    pub enabled: bool,
    /// Proxy host
    pub host: String,
    /// SOCKS5 port
    pub socks_port: u16,
    /// Control-channel port used for circuit rotation
    pub control_port: u16,
    /// Attempts per `fetch` call
    pub max_retries: u32,
    /// Fixed delay between retry attempts
    pub retry_delay: Duration,
    /// Timeout for the TCP availability probe and control-channel I/O
    pub probe_timeout: Duration,
    /// Per-request HTTP timeout
    pub request_timeout: Duration,
    /// Interval of the proactive background rotation
    pub rotation_interval: Duration,
    /// Enable the background rotation task
    pub enable_auto_rotation: bool,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            host: "127.0.0.1".to_string(),
            socks_port: 9050,
            control_port: 9051,
            max_retries: 3,
            retry_delay: Duration::from_secs(1),
            probe_timeout: Duration::from_secs(3),
            request_timeout: Duration::from_secs(30),
            rotation_interval: Duration::from_secs(300), // 5 minutes
            enable_auto_rotation: true,
        }
    }
}

/// Transport availability as observed by the most recent probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProxyState {
    /// Constructed with `enabled = false`; permanent for the transport
    Disabled,
    /// Probe in flight
    Probing,
    /// Probe succeeded
    Available,
    /// Probe failed; re-probed on the next call
    Unavailable,
}

/// One proxy circuit: the HTTP client bound to it and when it was built.
///
/// Replaced wholesale on rotation so in-flight requests keep a consistent
/// handle; readers re-acquire the current client at request time.
#[derive(Debug, Clone)]
struct ProxySession {
    client: reqwest::Client,
    established_at: Instant,
}

type SessionFactory =
    Arc<dyn Fn(&ProxyConfig) -> Result<reqwest::Client, ResolveError> + Send + Sync>;

fn socks_session_factory(config: &ProxyConfig) -> Result<reqwest::Client, ResolveError> {
    let proxy_url = format!("socks5h://{}:{}", config.host, config.socks_port);
    let proxy = reqwest::Proxy::all(&proxy_url).map_err(|err| ResolveError::ProxyUnavailable {
        reason: format!("invalid proxy URL '{proxy_url}': {err}"),
    })?;
    reqwest::Client::builder()
        .proxy(proxy)
        .timeout(config.request_timeout)
        .build()
        .map_err(|err| ResolveError::ProxyUnavailable {
            reason: format!("failed to build proxied client: {err}"),
        })
}

/// HTTP fetch capability tunneled through a SOCKS proxy.
pub struct ProxyTransport {
    config: ProxyConfig,
    session: Arc<RwLock<ProxySession>>,
    state: Arc<RwLock<ProxyState>>,
    session_factory: SessionFactory,
    rotation_count: Arc<AtomicU64>,
    _rotation_handle: Option<tokio::task::JoinHandle<()>>,
}

impl std::fmt::Debug for ProxyTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProxyTransport")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl ProxyTransport {
    /// Creates a transport for the given configuration.
    ///
    /// # Errors
    /// - `ResolveError::ProxyUnavailable` - the proxied HTTP client could not be built
    pub fn new(config: ProxyConfig) -> Result<Self, ResolveError> {
        Self::with_session_factory(config, Arc::new(socks_session_factory))
    }

    /// Creates a transport with a custom client factory. Used by tests to
    /// exercise the retry/rotation policy without a live SOCKS proxy.
    pub fn with_session_factory(
        config: ProxyConfig,
        session_factory: SessionFactory,
    ) -> Result<Self, ResolveError> {
        let client = session_factory(&config)?;
        let session = Arc::new(RwLock::new(ProxySession {
            client,
            established_at: Instant::now(),
        }));
        let initial_state = if config.enabled {
            ProxyState::Probing
        } else {
            ProxyState::Disabled
        };
        let state = Arc::new(RwLock::new(initial_state));
        let rotation_count = Arc::new(AtomicU64::new(0));

        let rotation_handle = if config.enabled && config.enable_auto_rotation {
            let config_clone = config.clone();
            let session_clone = Arc::clone(&session);
            let factory_clone = Arc::clone(&session_factory);
            let count_clone = Arc::clone(&rotation_count);

            Some(tokio::spawn(async move {
                let mut interval = tokio::time::interval(config_clone.rotation_interval);
                interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
                // First tick fires immediately; skip it so the interval
                // counts from transport construction.
                interval.tick().await;
                loop {
                    interval.tick().await;
                    if let Err(err) =
                        rotate(&config_clone, &session_clone, &factory_clone, &count_clone).await
                    {
                        tracing::warn!("Scheduled circuit rotation failed: {err}");
                    }
                }
            }))
        } else {
            None
        };

        Ok(Self {
            config,
            session,
            state,
            session_factory,
            rotation_count,
            _rotation_handle: rotation_handle,
        })
    }

    /// Current transport state.
    pub async fn state(&self) -> ProxyState {
        *self.state.read().await
    }

    /// Number of successful circuit rotations since construction.
    pub fn rotation_count(&self) -> u64 {
        self.rotation_count.load(Ordering::Relaxed)
    }

    /// Performs an HTTP GET through the proxy.
    ///
    /// # Errors
    /// - `ResolveError::ProxyDisabled` - transport constructed with `enabled = false`
    /// - `ResolveError::ProxyUnavailable` - the SOCKS port did not answer the probe
    /// - `ResolveError::Network` - retries exhausted on a retryable failure
    pub async fn fetch(&self, url: &str) -> Result<reqwest::Response, ResolveError> {
        self.fetch_with_deadline(url, None).await
    }

    /// Performs an HTTP GET with an outer deadline that bounds the whole
    /// retry loop: retries never restart the caller's budget.
    ///
    /// # Errors
    /// Same as [`fetch`](Self::fetch), plus `ResolveError::RemoteTimeout`
    /// when the deadline expires between attempts.
    pub async fn fetch_with_deadline(
        &self,
        url: &str,
        deadline: Option<Instant>,
    ) -> Result<reqwest::Response, ResolveError> {
        if !self.config.enabled {
            return Err(ResolveError::ProxyDisabled);
        }

        // The first fetch probes the SOCKS port; once seen available the
        // probe is skipped. A failed probe leaves Unavailable, so the next
        // call probes again.
        if *self.state.read().await != ProxyState::Available {
            self.probe().await?;
        }

        let mut last_error = ResolveError::Network {
            reason: "no fetch attempts made".to_string(),
        };

        for attempt in 1..=self.config.max_retries {
            if let Some(deadline) = deadline
                && Instant::now() >= deadline
            {
                return Err(ResolveError::RemoteTimeout {
                    reason: format!("deadline exceeded before attempt {attempt}"),
                });
            }

            // Re-acquire the current circuit handle each attempt so a
            // concurrent rotation is picked up cleanly.
            let client = self.session.read().await.client.clone();

            match client.get(url).send().await {
                Ok(response) if response.status() == reqwest::StatusCode::BAD_GATEWAY => {
                    tracing::warn!("HTTP 502 from {url} on attempt {attempt}, rotating circuit");
                    last_error = ResolveError::Network {
                        reason: "HTTP 502 Bad Gateway".to_string(),
                    };
                }
                // Any other status, 2xx or not, is not presumed transient.
                Ok(response) => return Ok(response),
                Err(err) if err.is_timeout() || err.is_connect() => {
                    tracing::warn!("Transport failure on attempt {attempt} for {url}: {err}");
                    last_error = ResolveError::from_request(&err);
                }
                Err(err) => return Err(ResolveError::from_request(&err)),
            }

            if attempt < self.config.max_retries {
                // Rotation failure is swallowed: retrying on the existing
                // circuit beats aborting the whole fetch.
                if let Err(err) = self.rotate_circuit().await {
                    tracing::warn!("Circuit rotation failed, retrying on existing circuit: {err}");
                }

                let mut delay = self.config.retry_delay;
                if let Some(deadline) = deadline {
                    let remaining = deadline.saturating_duration_since(Instant::now());
                    delay = delay.min(remaining);
                }
                tokio::time::sleep(delay).await;
            }
        }

        Err(last_error)
    }

    /// Requests a fresh circuit over the control channel and swaps in a new
    /// session on success.
    ///
    /// # Errors
    /// - `ResolveError::Network` - control channel unreachable or the proxy
    ///   did not acknowledge with `250 OK`
    /// - `ResolveError::ProxyUnavailable` - replacement client build failed
    pub async fn rotate_circuit(&self) -> Result<(), ResolveError> {
        rotate(
            &self.config,
            &self.session,
            &self.session_factory,
            &self.rotation_count,
        )
        .await
    }

    async fn probe(&self) -> Result<(), ResolveError> {
        *self.state.write().await = ProxyState::Probing;

        let target = (self.config.host.as_str(), self.config.socks_port);
        match tokio::time::timeout(self.config.probe_timeout, TcpStream::connect(target)).await {
            Ok(Ok(_stream)) => {
                *self.state.write().await = ProxyState::Available;
                Ok(())
            }
            Ok(Err(err)) => {
                *self.state.write().await = ProxyState::Unavailable;
                Err(ResolveError::ProxyUnavailable {
                    reason: format!(
                        "SOCKS port {}:{} refused: {err}",
                        self.config.host, self.config.socks_port
                    ),
                })
            }
            Err(_) => {
                *self.state.write().await = ProxyState::Unavailable;
                Err(ResolveError::ProxyUnavailable {
                    reason: format!(
                        "SOCKS port {}:{} probe timed out",
                        self.config.host, self.config.socks_port
                    ),
                })
            }
        }
    }
}

/// Control-channel rotation, shared between on-demand retries and the
/// background timer. Never holds the session lock across the network I/O.
async fn rotate(
    config: &ProxyConfig,
    session: &Arc<RwLock<ProxySession>>,
    session_factory: &SessionFactory,
    rotation_count: &Arc<AtomicU64>,
) -> Result<(), ResolveError> {
    let target = (config.host.as_str(), config.control_port);
    let mut stream = tokio::time::timeout(config.probe_timeout, TcpStream::connect(target))
        .await
        .map_err(|_| ResolveError::Network {
            reason: "control channel connect timed out".to_string(),
        })?
        .map_err(|err| ResolveError::Network {
            reason: format!("control channel connect failed: {err}"),
        })?;

    stream
        .write_all(b"AUTHENTICATE \"\"\r\nSIGNAL NEWNYM\r\nQUIT\r\n")
        .await
        .map_err(|err| ResolveError::Network {
            reason: format!("control channel write failed: {err}"),
        })?;

    let mut response = Vec::with_capacity(256);
    tokio::time::timeout(config.probe_timeout, stream.read_to_end(&mut response))
        .await
        .map_err(|_| ResolveError::Network {
            reason: "control channel read timed out".to_string(),
        })?
        .map_err(|err| ResolveError::Network {
            reason: format!("control channel read failed: {err}"),
        })?;

    let response = String::from_utf8_lossy(&response);
    if !response.contains("250 OK") {
        return Err(ResolveError::Network {
            reason: format!("circuit rotation rejected: {}", response.trim()),
        });
    }

    // NEWNYM alone does not retire pooled connections, so the client is
    // rebuilt and the session swapped under the lock.
    let client = session_factory(config)?;
    {
        let mut current = session.write().await;
        *current = ProxySession {
            client,
            established_at: Instant::now(),
        };
    }
    rotation_count.fetch_add(1, Ordering::Relaxed);
    tracing::debug!("Proxy circuit rotated");
    Ok(())
}

impl Drop for ProxyTransport {
    fn drop(&mut self) {
        if let Some(handle) = self._rotation_handle.take() {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use tokio::net::TcpListener;

    use super::*;

    fn direct_factory() -> SessionFactory {
        Arc::new(|_config: &ProxyConfig| Ok(reqwest::Client::new()))
    }

    /// Minimal HTTP server: answers the nth connection with the nth
    /// configured status, then 200s. Closes after each response so every
    /// request opens a fresh connection.
    async fn spawn_http_server(statuses: Vec<u16>) -> (u16, Arc<AtomicUsize>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let hits = Arc::new(AtomicUsize::new(0));
        let hits_task = Arc::clone(&hits);

        tokio::spawn(async move {
            let mut remaining = statuses.into_iter();
            loop {
                let Ok((mut stream, _)) = listener.accept().await else {
                    break;
                };
                hits_task.fetch_add(1, Ordering::SeqCst);
                let status = remaining.next().unwrap_or(200);
                let mut buffer = [0u8; 1024];
                let _ = stream.read(&mut buffer).await;
                let body = "{}";
                let response = format!(
                    "HTTP/1.1 {status} X\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                    body.len()
                );
                let _ = stream.write_all(response.as_bytes()).await;
            }
        });
        (port, hits)
    }

    /// Fake control server answering every connection with the given reply.
    async fn spawn_control_server(reply: &'static str) -> (u16, Arc<AtomicUsize>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let rotations = Arc::new(AtomicUsize::new(0));
        let rotations_task = Arc::clone(&rotations);

        tokio::spawn(async move {
            loop {
                let Ok((mut stream, _)) = listener.accept().await else {
                    break;
                };
                rotations_task.fetch_add(1, Ordering::SeqCst);
                let mut buffer = [0u8; 256];
                let _ = stream.read(&mut buffer).await;
                let _ = stream.write_all(reply.as_bytes()).await;
            }
        });
        (port, rotations)
    }

    fn enabled_config(socks_port: u16, control_port: u16) -> ProxyConfig {
        ProxyConfig {
            enabled: true,
            host: "127.0.0.1".to_string(),
            socks_port,
            control_port,
            max_retries: 3,
            retry_delay: Duration::from_millis(10),
            probe_timeout: Duration::from_millis(500),
            request_timeout: Duration::from_secs(5),
            enable_auto_rotation: false,
            ..ProxyConfig::default()
        }
    }

    #[tokio::test]
    async fn test_disabled_transport_fails_fast() {
        let transport = ProxyTransport::with_session_factory(
            ProxyConfig {
                enabled: false,
                ..ProxyConfig::default()
            },
            direct_factory(),
        )
        .unwrap();

        assert_eq!(transport.state().await, ProxyState::Disabled);
        let result = transport.fetch("http://127.0.0.1:1/whatever").await;
        assert!(matches!(result, Err(ResolveError::ProxyDisabled)));
    }

    #[tokio::test]
    async fn test_probe_failure_is_unavailable_not_fatal() {
        // Bind then drop to get a port that is very likely closed.
        let closed_port = {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap().port()
        };

        let transport = ProxyTransport::with_session_factory(
            enabled_config(closed_port, closed_port),
            direct_factory(),
        )
        .unwrap();

        let result = transport.fetch("http://example.invalid/").await;
        assert!(matches!(result, Err(ResolveError::ProxyUnavailable { .. })));
        assert_eq!(transport.state().await, ProxyState::Unavailable);
    }

    /// Probe target that accepts and immediately drops connections, counting
    /// each accept.
    async fn spawn_probe_target() -> (u16, Arc<AtomicUsize>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let probes = Arc::new(AtomicUsize::new(0));
        let probes_task = Arc::clone(&probes);

        tokio::spawn(async move {
            loop {
                let Ok((_stream, _)) = listener.accept().await else {
                    break;
                };
                probes_task.fetch_add(1, Ordering::SeqCst);
            }
        });
        (port, probes)
    }

    #[tokio::test]
    async fn test_available_transport_probes_only_once() {
        let (socks_port, probes) = spawn_probe_target().await;
        let (http_port, hits) = spawn_http_server(Vec::new()).await;

        let transport =
            ProxyTransport::with_session_factory(enabled_config(socks_port, 1), direct_factory())
                .unwrap();

        for _ in 0..3 {
            let response = transport
                .fetch(&format!("http://127.0.0.1:{http_port}/search"))
                .await
                .unwrap();
            assert_eq!(response.status(), reqwest::StatusCode::OK);
        }

        assert_eq!(transport.state().await, ProxyState::Available);
        assert_eq!(hits.load(Ordering::SeqCst), 3);
        assert_eq!(probes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_retry_rotates_once_on_502_then_succeeds() {
        // Probe target: a listener that accepts connections.
        let socks_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let socks_port = socks_listener.local_addr().unwrap().port();

        let (control_port, rotations) =
            spawn_control_server("250 OK\r\n250 OK\r\n250 closing connection\r\n").await;
        let (http_port, hits) = spawn_http_server(vec![502]).await;

        let transport = ProxyTransport::with_session_factory(
            enabled_config(socks_port, control_port),
            direct_factory(),
        )
        .unwrap();

        let response = transport
            .fetch(&format!("http://127.0.0.1:{http_port}/search"))
            .await
            .unwrap();

        assert_eq!(response.status(), reqwest::StatusCode::OK);
        assert_eq!(hits.load(Ordering::SeqCst), 2);
        assert_eq!(rotations.load(Ordering::SeqCst), 1);
        assert_eq!(transport.rotation_count(), 1);
    }

    #[tokio::test]
    async fn test_non_502_status_returned_without_retry() {
        let socks_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let socks_port = socks_listener.local_addr().unwrap().port();
        let (control_port, rotations) = spawn_control_server("250 OK\r\n").await;
        let (http_port, hits) = spawn_http_server(vec![404]).await;

        let transport = ProxyTransport::with_session_factory(
            enabled_config(socks_port, control_port),
            direct_factory(),
        )
        .unwrap();

        let response = transport
            .fetch(&format!("http://127.0.0.1:{http_port}/missing"))
            .await
            .unwrap();

        assert_eq!(response.status(), reqwest::StatusCode::NOT_FOUND);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(rotations.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_exhausted_retries_surface_last_error() {
        let socks_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let socks_port = socks_listener.local_addr().unwrap().port();
        let (control_port, rotations) = spawn_control_server("250 OK\r\n").await;
        let (http_port, hits) = spawn_http_server(vec![502, 502, 502]).await;

        let transport = ProxyTransport::with_session_factory(
            enabled_config(socks_port, control_port),
            direct_factory(),
        )
        .unwrap();

        let result = transport
            .fetch(&format!("http://127.0.0.1:{http_port}/search"))
            .await;

        assert!(matches!(result, Err(ResolveError::Network { .. })));
        assert_eq!(hits.load(Ordering::SeqCst), 3);
        // One rotation between each pair of attempts.
        assert_eq!(rotations.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_expired_deadline_stops_retry_loop() {
        let socks_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let socks_port = socks_listener.local_addr().unwrap().port();

        let transport =
            ProxyTransport::with_session_factory(enabled_config(socks_port, 1), direct_factory())
                .unwrap();

        let expired = Instant::now() - Duration::from_secs(1);
        let result = transport
            .fetch_with_deadline("http://example.invalid/", Some(expired))
            .await;
        assert!(matches!(result, Err(ResolveError::RemoteTimeout { .. })));
    }

    #[tokio::test]
    async fn test_rotation_requires_acknowledgement() {
        let (control_port, _) = spawn_control_server("515 Authentication failed\r\n").await;

        let transport = ProxyTransport::with_session_factory(
            enabled_config(1, control_port),
            direct_factory(),
        )
        .unwrap();

        let result = transport.rotate_circuit().await;
        assert!(matches!(result, Err(ResolveError::Network { .. })));
        assert_eq!(transport.rotation_count(), 0);
    }
}
