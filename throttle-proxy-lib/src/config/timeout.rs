use std::time::Duration;

/// Timeout configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeoutConfig {
    /// Deadline for a single forwarded request, from dispatch until the
    /// backend response head arrives
    /// Default: 30 seconds
    pub proxy: Duration,
    /// Backend connect timeout
    /// Default: 30 seconds
    pub connect: Duration,
    /// Graceful shutdown timeout
    /// Maximum time to wait for in-flight connections after a shutdown signal
    /// Default: 30 seconds
    pub shutdown: Duration,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            proxy: default_proxy_timeout(),
            connect: default_connect_timeout(),
            shutdown: default_shutdown_timeout(),
        }
    }
}

pub(crate) fn default_proxy_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_connect_timeout() -> Duration {
    Duration::from_secs(30)
}

pub(crate) fn default_shutdown_timeout() -> Duration {
    Duration::from_secs(30)
}
