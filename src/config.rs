//! Configuration management for the relay dispatcher
//!
//! Static settings are loaded from environment variables. The keepalive
//! settings that operators may change while the relay is running are
//! published through a `watch` channel as [`GeneralSettings`].

use anyhow::{Context, Result};
use std::env;
use std::time::Duration;
use tokio::sync::watch;

/// Interval used when keepalive is enabled but no positive interval is set
pub const DEFAULT_PING_INTERVAL: Duration = Duration::from_secs(10);

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Whether streaming sends run the keepalive supervisor
    pub ping_interval_enabled: bool,
    /// Keepalive interval in seconds (0 falls back to the default)
    pub ping_interval_seconds: u64,

    /// Total request timeout for upstream calls (0 disables the timeout)
    pub http_timeout_seconds: u64,
    /// Idle connections kept per upstream host
    pub pool_max_idle_per_host: usize,

    /// Replace upstream transport errors with a generic message for clients
    pub hide_upstream_errors: bool,

    /// Log resolved upstream URLs (development only)
    pub debug_enabled: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            ping_interval_enabled: false,
            ping_interval_seconds: DEFAULT_PING_INTERVAL.as_secs(),
            http_timeout_seconds: 300,
            pool_max_idle_per_host: 100,
            hide_upstream_errors: true,
            debug_enabled: false,
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();
        Ok(Self {
            ping_interval_enabled: env_flag("RELAY_PING_INTERVAL_ENABLED")
                .unwrap_or(defaults.ping_interval_enabled),
            ping_interval_seconds: env::var("RELAY_PING_INTERVAL_SECONDS")
                .unwrap_or_else(|_| defaults.ping_interval_seconds.to_string())
                .parse()
                .context("Invalid RELAY_PING_INTERVAL_SECONDS")?,

            http_timeout_seconds: env::var("RELAY_HTTP_TIMEOUT_SECONDS")
                .unwrap_or_else(|_| defaults.http_timeout_seconds.to_string())
                .parse()
                .context("Invalid RELAY_HTTP_TIMEOUT_SECONDS")?,
            pool_max_idle_per_host: env::var("RELAY_POOL_MAX_IDLE_PER_HOST")
                .unwrap_or_else(|_| defaults.pool_max_idle_per_host.to_string())
                .parse()
                .context("Invalid RELAY_POOL_MAX_IDLE_PER_HOST")?,

            hide_upstream_errors: env_flag("RELAY_HIDE_UPSTREAM_ERRORS")
                .unwrap_or(defaults.hide_upstream_errors),

            debug_enabled: env_flag("RELAY_DEBUG").unwrap_or(defaults.debug_enabled),
        })
    }

    /// Load a `.env` file if one exists, then read the environment
    pub fn from_env_file() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_env()
    }

    /// Upstream request timeout, `None` when disabled
    pub fn http_timeout(&self) -> Option<Duration> {
        (self.http_timeout_seconds > 0).then(|| Duration::from_secs(self.http_timeout_seconds))
    }

    /// Snapshot of the runtime-adjustable settings
    pub fn general_settings(&self) -> GeneralSettings {
        GeneralSettings {
            ping_interval_enabled: self.ping_interval_enabled,
            ping_interval_seconds: self.ping_interval_seconds,
        }
    }
}

fn env_flag(key: &str) -> Option<bool> {
    env::var(key).ok().map(|v| v == "true" || v == "1")
}

/// Settings read on every streaming send
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GeneralSettings {
    pub ping_interval_enabled: bool,
    pub ping_interval_seconds: u64,
}

impl GeneralSettings {
    /// Effective keepalive interval; non-positive values use the default
    pub fn ping_interval(&self) -> Duration {
        if self.ping_interval_seconds == 0 {
            DEFAULT_PING_INTERVAL
        } else {
            Duration::from_secs(self.ping_interval_seconds)
        }
    }
}

/// Create a settings channel seeded from `config`
///
/// The sender side stays with whoever administers the relay; the receiver
/// is handed to the dispatcher.
pub fn settings_channel(
    config: &Config,
) -> (watch::Sender<GeneralSettings>, watch::Receiver<GeneralSettings>) {
    watch::channel(config.general_settings())
}
