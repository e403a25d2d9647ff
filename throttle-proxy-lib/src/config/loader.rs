use std::fmt::Display;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use tracing::warn;

use super::backend::{default_idle_timeout, default_max_idle_conns, BackendPoolConfig};
use super::timeout::{default_proxy_timeout, default_shutdown_timeout, TimeoutConfig};
use super::types::{
    Config, EvictionConfig, DEFAULT_BACKEND_URL, DEFAULT_CONTAINER_ID, DEFAULT_RATE_LIMIT,
};
use super::validator::{validate_backend_url, validate_webhook_url};
use crate::error::{ProxyError, Result};

/// Environment variable names read by [`load_from_env`]
pub mod vars {
    pub const BACKEND_URL: &str = "BACKEND_URL";
    pub const RATE_LIMIT: &str = "RATE_LIMIT";
    pub const CONTAINER_ID: &str = "CONTAINER_ID";
    pub const WEBHOOK_URL: &str = "WEBHOOK_URL";
    pub const PROXY_TIMEOUT: &str = "PROXY_TIMEOUT";
    pub const MAX_IDLE_CONNS: &str = "MAX_IDLE_CONNS";
    pub const IDLE_CONN_TIMEOUT: &str = "IDLE_CONN_TIMEOUT";
    pub const LISTEN_ADDR: &str = "LISTEN_ADDR";
    pub const METRICS_PORT: &str = "METRICS_PORT";
    pub const SHUTDOWN_TIMEOUT: &str = "SHUTDOWN_TIMEOUT";
    pub const EVICTION_INTERVAL: &str = "EVICTION_INTERVAL";
    pub const STALENESS_THRESHOLD: &str = "STALENESS_THRESHOLD";
}

/// Load a dotenv file into the process environment.
///
/// With an explicit `path` the file must exist. Without one, `.env` is looked
/// up from the working directory and its absence is not an error. Variables
/// already present in the environment are never overridden.
pub fn load_dotenv(path: Option<&Path>) -> Result<Option<PathBuf>> {
    match path {
        Some(p) => dotenvy::from_path(p)
            .map(|()| Some(p.to_path_buf()))
            .map_err(|e| {
                ProxyError::Config(format!("Failed to load env file {}: {e}", p.display()))
            }),
        None => match dotenvy::dotenv() {
            Ok(found) => Ok(Some(found)),
            Err(e) if e.not_found() => Ok(None),
            Err(e) => Err(ProxyError::Config(format!("Failed to load .env file: {e}"))),
        },
    }
}

/// Load configuration from the process environment.
pub fn load_from_env() -> Result<Config> {
    load_with(|key| std::env::var(key).ok())
}

/// Load configuration from an arbitrary key lookup.
///
/// Unset or empty keys take their default. Values that fail to parse are
/// logged and replaced by the default. An invalid webhook URL disables
/// notifications; only an invalid backend URL is fatal.
pub fn load_with<F>(lookup: F) -> Result<Config>
where
    F: Fn(&str) -> Option<String>,
{
    let env = EnvSource { lookup };
    let defaults = Config::default();

    let backend_raw = env
        .string(vars::BACKEND_URL)
        .unwrap_or_else(|| DEFAULT_BACKEND_URL.to_string());
    let backend_url = validate_backend_url(&backend_raw)?;

    let webhook_url = env
        .string(vars::WEBHOOK_URL)
        .filter(|url| match validate_webhook_url(url) {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "invalid webhook URL, notifications disabled");
                false
            }
        });

    Ok(Config {
        listen: env.parse_or(vars::LISTEN_ADDR, defaults.listen),
        backend_url,
        rate_limit: env.positive_or(vars::RATE_LIMIT, DEFAULT_RATE_LIMIT),
        container_id: env
            .string(vars::CONTAINER_ID)
            .unwrap_or_else(|| DEFAULT_CONTAINER_ID.to_string()),
        webhook_url,
        timeout: TimeoutConfig {
            proxy: env.seconds_or(vars::PROXY_TIMEOUT, default_proxy_timeout()),
            connect: defaults.timeout.connect,
            shutdown: env.seconds_or(vars::SHUTDOWN_TIMEOUT, default_shutdown_timeout()),
        },
        backend_pool: BackendPoolConfig {
            max_idle_conns: env.parse_or(vars::MAX_IDLE_CONNS, default_max_idle_conns()),
            idle_timeout: env.seconds_or(vars::IDLE_CONN_TIMEOUT, default_idle_timeout()),
            tcp_keepalive: defaults.backend_pool.tcp_keepalive,
        },
        eviction: EvictionConfig {
            interval: env.seconds_or(vars::EVICTION_INTERVAL, defaults.eviction.interval),
            staleness_threshold: env
                .seconds_or(vars::STALENESS_THRESHOLD, defaults.eviction.staleness_threshold),
        },
        metrics_port: env.optional(vars::METRICS_PORT),
    })
}

struct EnvSource<F> {
    lookup: F,
}

impl<F> EnvSource<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn string(&self, key: &str) -> Option<String> {
        (self.lookup)(key)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn parse_or<T>(&self, key: &str, default: T) -> T
    where
        T: FromStr + Display,
    {
        match self.string(key) {
            None => default,
            Some(raw) => raw.parse().unwrap_or_else(|_| {
                warn!(key, value = %raw, %default, "invalid configuration value, using default");
                default
            }),
        }
    }

    fn optional<T: FromStr>(&self, key: &str) -> Option<T> {
        let raw = self.string(key)?;
        match raw.parse() {
            Ok(v) => Some(v),
            Err(_) => {
                warn!(key, value = %raw, "invalid configuration value, ignoring");
                None
            }
        }
    }

    fn positive_or(&self, key: &str, default: u32) -> u32 {
        match self.parse_or(key, default) {
            0 => {
                warn!(key, %default, "configuration value must be positive, using default");
                default
            }
            v => v,
        }
    }

    fn seconds_or(&self, key: &str, default: Duration) -> Duration {
        let default_secs = default.as_secs();
        match self.parse_or::<u64>(key, default_secs) {
            0 => {
                warn!(key, default = default_secs, "duration must be at least 1s, using default");
                default
            }
            secs => Duration::from_secs(secs),
        }
    }
}
