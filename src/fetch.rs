//! Network access for cache misses and install-time population.

use std::time::Duration;

use async_trait::async_trait;
use url::Url;

use crate::config::OriginConfig;
use crate::error::{Error, Result};
use crate::request::{CachedResponse, Method, Request};

/// Performs live network fetches.
///
/// Any HTTP status is a response; only transport failures are errors.
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Fetches `request` from the network.
    async fn fetch(&self, request: &Request) -> Result<CachedResponse>;
}

/// Builds a configured HTTP client for asset requests.
///
/// # Errors
///
/// Returns an error if the TLS backend cannot be initialised.
pub fn build_http_client(timeout: Duration) -> reqwest::Result<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent(concat!("pwa-cache/", env!("CARGO_PKG_VERSION")))
        .timeout(timeout)
        .pool_idle_timeout(Duration::from_secs(60))
        .pool_max_idle_per_host(8)
        .tcp_keepalive(Duration::from_secs(30))
        .build()
}

/// Fetches request paths from a fixed origin over HTTP.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
    base: Url,
}

impl HttpFetcher {
    /// Creates a fetcher for `base_url` using `client`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidUrl`] if `base_url` does not parse.
    pub fn new(client: reqwest::Client, base_url: &str) -> Result<Self> {
        let base = Url::parse(base_url).map_err(|e| Error::InvalidUrl {
            url: base_url.to_string(),
            reason: e.to_string(),
        })?;
        Ok(Self { client, base })
    }

    /// Creates a fetcher from origin configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the client cannot be built or the URL is invalid.
    pub fn from_config(origin: &OriginConfig) -> Result<Self> {
        let client = build_http_client(origin.timeout())?;
        Self::new(client, &origin.base_url)
    }

    /// Returns the origin requests are resolved against.
    #[must_use]
    pub const fn base(&self) -> &Url {
        &self.base
    }

    /// Resolves a request path against the origin.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidUrl`] if the join fails or lands on another
    /// origin (e.g. a scheme-relative `//host/path`).
    pub fn resolve(&self, path: &str) -> Result<Url> {
        let url = self.base.join(path).map_err(|e| Error::InvalidUrl {
            url: path.to_string(),
            reason: e.to_string(),
        })?;
        if url.origin() != self.base.origin() {
            return Err(Error::InvalidUrl {
                url: path.to_string(),
                reason: format!("outside origin {}", self.base.origin().ascii_serialization()),
            });
        }
        Ok(url)
    }
}

fn to_reqwest_method(method: Method) -> reqwest::Method {
    match method {
        Method::Get => reqwest::Method::GET,
        Method::Head => reqwest::Method::HEAD,
        Method::Post => reqwest::Method::POST,
        Method::Put => reqwest::Method::PUT,
        Method::Patch => reqwest::Method::PATCH,
        Method::Delete => reqwest::Method::DELETE,
        Method::Options => reqwest::Method::OPTIONS,
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, request: &Request) -> Result<CachedResponse> {
        let url = self.resolve(request.url())?;
        log::debug!("network {} {url}", request.method());

        let response = self
            .client
            .request(to_reqwest_method(request.method()), url)
            .send()
            .await?;

        let status = response.status().as_u16();
        let mut cached = CachedResponse::new(request.url(), status, bytes::Bytes::new());
        for (name, value) in response.headers() {
            if let Ok(value) = value.to_str() {
                cached.headers.insert(name.as_str().to_string(), value.to_string());
            }
        }
        cached.body = response.bytes().await?;
        Ok(cached)
    }
}
