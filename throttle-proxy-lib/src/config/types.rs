use std::net::SocketAddr;
use std::time::Duration;

use http::Uri;

use super::backend::BackendPoolConfig;
use super::timeout::TimeoutConfig;

pub const DEFAULT_BACKEND_URL: &str = "http://localhost:8080";
pub const DEFAULT_RATE_LIMIT: u32 = 10;
pub const DEFAULT_CONTAINER_ID: &str = "unknown-container";

/// Per-client state eviction settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvictionConfig {
    /// How often the eviction sweep runs
    /// Default: 60 seconds
    pub interval: Duration,
    /// Idle time after which a client's tracker and gate are dropped
    /// Default: 60 seconds
    pub staleness_threshold: Duration,
}

impl Default for EvictionConfig {
    fn default() -> Self {
        Self { interval: Duration::from_secs(60), staleness_threshold: Duration::from_secs(60) }
    }
}

/// Main configuration structure
///
/// Loaded once at startup (see [`crate::config::load_from_env`]) and shared
/// read-only for the lifetime of the process.
#[derive(Debug, Clone)]
pub struct Config {
    /// Address and port to listen on
    /// Default: 0.0.0.0:8080
    pub listen: SocketAddr,
    /// Backend target every admitted request is forwarded to
    /// Must be an absolute `http://` URL; an optional path is used as base path
    pub backend_url: Uri,
    /// Allowed requests per second per client
    /// Default: 10
    pub rate_limit: u32,
    /// Identifier of this instance, reported in rate limit notifications
    /// Default: "unknown-container"
    pub container_id: String,
    /// Rate limit notification target; `None` disables notifications
    pub webhook_url: Option<String>,
    /// Timeout configuration
    pub timeout: TimeoutConfig,
    /// Backend connection pool configuration
    pub backend_pool: BackendPoolConfig,
    /// Client state eviction configuration
    pub eviction: EvictionConfig,
    /// Port of the observability server (metrics + health)
    /// Default: None (disabled)
    pub metrics_port: Option<u16>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen: SocketAddr::from(([0, 0, 0, 0], 8080)),
            backend_url: Uri::from_static(DEFAULT_BACKEND_URL),
            rate_limit: DEFAULT_RATE_LIMIT,
            container_id: DEFAULT_CONTAINER_ID.to_string(),
            webhook_url: None,
            timeout: TimeoutConfig::default(),
            backend_pool: BackendPoolConfig::default(),
            eviction: EvictionConfig::default(),
            metrics_port: None,
        }
    }
}
