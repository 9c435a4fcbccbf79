//! HTTP request capability.
//!
//! Steps never talk to the network directly: they call
//! [`Engine::request`](crate::Engine::request), which forwards to the
//! injected [`Requester`]. The default [`HttpClient`] is reqwest-backed.
//!
//! Features of the default client:
//! - HTTP/2 when the server negotiates it
//! - TLS 1.3 via rustls
//! - Brotli, Zstd, Gzip compression (auto-negotiated)
//! - Transport-level retries (never on an HTTP status)

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use http::Method;
use reqwest::Client;
use tracing::{debug, instrument, warn};

use crate::config::RequestConfig;
use crate::error::Result;

/// Per-request options.
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    /// Defaults to `GET`.
    pub method: Method,
    /// Extra headers, merged over the client defaults.
    pub headers: HashMap<String, String>,
}

impl RequestOptions {
    pub fn head() -> Self {
        Self {
            method: Method::HEAD,
            ..Self::default()
        }
    }
}

/// Response returned for every status code.
#[derive(Debug, Clone, Default)]
pub struct HttpResponse {
    pub status: u16,
    /// Header names are lower-cased.
    pub headers: HashMap<String, String>,
    pub body: Bytes,
}

impl HttpResponse {
    /// Build an in-memory response. Used by stub requesters.
    pub fn new(status: u16, content_type: Option<&str>, body: impl Into<Bytes>) -> Self {
        let mut headers = HashMap::new();
        if let Some(ct) = content_type {
            headers.insert("content-type".to_string(), ct.to_string());
        }
        Self {
            status,
            headers,
            body: body.into(),
        }
    }

    /// Body decoded as UTF-8, lossy.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    pub fn content_type(&self) -> &str {
        self.header("content-type").unwrap_or("")
    }
}

/// The network capability the engine depends on.
#[async_trait]
pub trait Requester: Send + Sync {
    /// Perform the request. Transport failures are errors; HTTP statuses
    /// are not.
    async fn request(&self, url: &str, options: &RequestOptions) -> Result<HttpResponse>;
}

/// Default reqwest-backed [`Requester`].
pub struct HttpClient {
    client: Client,
    retries: u32,
    headers: HashMap<String, String>,
}

impl HttpClient {
    /// Create a client with default request settings.
    pub fn new() -> Result<Self> {
        Self::with_config(&RequestConfig::default())
    }

    /// Create a client from request settings.
    pub fn with_config(config: &RequestConfig) -> Result<Self> {
        let client = Client::builder()
            // ═══════════════════════════════════════════════════════════════
            // CONNECTION
            // ═══════════════════════════════════════════════════════════════
            .http2_adaptive_window(true)
            .pool_max_idle_per_host(10)
            .pool_idle_timeout(Duration::from_secs(90))
            .tcp_keepalive(Duration::from_secs(60))
            .tcp_nodelay(true)
            .use_rustls_tls()
            // ═══════════════════════════════════════════════════════════════
            // COMPRESSION (auto-negotiated via Accept-Encoding)
            // ═══════════════════════════════════════════════════════════════
            .brotli(true)
            .zstd(true)
            .gzip(true)
            .deflate(true)
            // ═══════════════════════════════════════════════════════════════
            // IDENTITY & TIMEOUTS
            // ═══════════════════════════════════════════════════════════════
            .user_agent(config.user_agent.clone())
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(config.timeout_secs))
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()?;

        Ok(Self {
            client,
            retries: config.retries,
            headers: config.headers.clone(),
        })
    }

    async fn send_once(&self, url: &str, options: &RequestOptions) -> Result<HttpResponse> {
        let mut builder = self.client.request(options.method.clone(), url);
        for (name, value) in self.headers.iter().chain(options.headers.iter()) {
            builder = builder.header(name.as_str(), value.as_str());
        }

        let response = builder.send().await?;
        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_ascii_lowercase(), v.to_string()))
            })
            .collect();
        let body = response.bytes().await?;

        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }
}

#[async_trait]
impl Requester for HttpClient {
    #[instrument(skip(self, options), fields(url = %url, method = %options.method))]
    async fn request(&self, url: &str, options: &RequestOptions) -> Result<HttpResponse> {
        let mut attempt = 0;
        loop {
            match self.send_once(url, options).await {
                Ok(response) => {
                    debug!(status = response.status, "Response received");
                    return Ok(response);
                }
                Err(e) if attempt < self.retries => {
                    attempt += 1;
                    warn!("Request to {} failed (attempt {}): {}", url, attempt, e);
                }
                Err(e) => return Err(e),
            }
        }
    }
}
