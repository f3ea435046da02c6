//! Upstream HTTP client selection
//!
//! Channels without a proxy share one pooled client. Channels with a proxy
//! get a client bound to that proxy, built once per proxy URL and reused.
//! A configured but unusable proxy is an error; it never falls back to a
//! direct connection.

use std::time::Duration;

use dashmap::DashMap;
use reqwest::{Client, Proxy};
use tracing::{debug, info};

use crate::config::Config;
use crate::error::{RelayError, RelayResult};

/// Proxy schemes a channel may use
const SUPPORTED_PROXY_SCHEMES: &[&str] = &["http", "https", "socks5", "socks5h"];

/// Mask credentials in a proxy URL before it reaches the logs
pub fn redact_proxy_url(proxy_url: &str) -> String {
    url::Url::parse(proxy_url)
        .map(|u| {
            let host = u.host_str().unwrap_or("?");
            let port = u.port_or_known_default().unwrap_or(0);
            if u.username().is_empty() && u.password().is_none() {
                format!("{}://{}:{}", u.scheme(), host, port)
            } else {
                format!("{}://***@{}:{}", u.scheme(), host, port)
            }
        })
        .unwrap_or_else(|_| "<invalid-url>".to_string())
}

/// Hands out the client an outbound request should use
///
/// Proxy clients are never evicted. The cache holds one entry per distinct
/// proxy URL configured on a channel, so it is bounded by channel
/// configuration rather than by traffic.
pub struct ClientSelector {
    pooled: Client,
    proxied: DashMap<String, Client>,
    timeout: Option<Duration>,
    pool_max_idle_per_host: usize,
}

impl ClientSelector {
    /// Build the shared pooled client from `config`
    pub fn new(config: &Config) -> RelayResult<Self> {
        let timeout = config.http_timeout();
        let pooled = base_builder(timeout, config.pool_max_idle_per_host)
            .build()
            .map_err(|e| RelayError::RequestConstruction(format!("HTTP client builder failed: {e}")))?;

        Ok(Self::with_client(pooled, config))
    }

    /// Use an existing client as the shared pool
    pub fn with_client(pooled: Client, config: &Config) -> Self {
        Self {
            pooled,
            proxied: DashMap::new(),
            timeout: config.http_timeout(),
            pool_max_idle_per_host: config.pool_max_idle_per_host,
        }
    }

    /// Client for a channel with the given proxy setting
    pub fn select(&self, proxy_url: Option<&str>) -> RelayResult<Client> {
        match proxy_url {
            Some(url) if !url.is_empty() => self.proxy_client(url),
            _ => Ok(self.pooled.clone()),
        }
    }

    /// Number of distinct proxy clients built so far
    pub fn cached_proxy_clients(&self) -> usize {
        self.proxied.len()
    }

    fn proxy_client(&self, proxy_url: &str) -> RelayResult<Client> {
        if let Some(client) = self.proxied.get(proxy_url) {
            return Ok(client.clone());
        }

        let parsed = url::Url::parse(proxy_url)
            .map_err(|e| RelayError::ProxyClientConstruction(format!("invalid proxy URL: {e}")))?;
        if !SUPPORTED_PROXY_SCHEMES.contains(&parsed.scheme()) {
            return Err(RelayError::ProxyClientConstruction(format!(
                "unsupported proxy scheme: {}",
                parsed.scheme()
            )));
        }

        let proxy = Proxy::all(proxy_url)
            .map_err(|e| RelayError::ProxyClientConstruction(format!("invalid proxy URL: {e}")))?;
        let client = base_builder(self.timeout, self.pool_max_idle_per_host)
            .proxy(proxy)
            .build()
            .map_err(|e| {
                RelayError::ProxyClientConstruction(format!("HTTP client builder failed: {e}"))
            })?;

        info!(proxy = %redact_proxy_url(proxy_url), "Built upstream client for channel proxy");

        // A concurrent caller may have raced us; keep whichever landed first.
        let client = self
            .proxied
            .entry(proxy_url.to_string())
            .or_insert(client)
            .clone();
        debug!(cached = self.proxied.len(), "Proxy client cache updated");
        Ok(client)
    }
}

fn base_builder(timeout: Option<Duration>, pool_max_idle_per_host: usize) -> reqwest::ClientBuilder {
    let builder = Client::builder()
        .pool_max_idle_per_host(pool_max_idle_per_host)
        .tcp_nodelay(true);
    match timeout {
        Some(timeout) => builder.timeout(timeout),
        None => builder,
    }
}
