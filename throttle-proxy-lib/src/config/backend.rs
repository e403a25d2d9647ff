use std::time::Duration;

/// Backend connection pool configuration
///
/// All admitted requests share one pooled client, so these bound how many
/// idle keep-alive connections to the backend are retained and for how long.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendPoolConfig {
    /// Maximum idle connections kept per backend host
    /// 0 leaves the pool unbounded
    /// Default: 100
    pub max_idle_conns: usize,
    /// How long an idle connection stays in the pool
    /// Default: 90 seconds
    pub idle_timeout: Duration,
    /// TCP keep-alive interval for backend connections
    /// Default: 30 seconds
    pub tcp_keepalive: Duration,
}

impl Default for BackendPoolConfig {
    fn default() -> Self {
        Self {
            max_idle_conns: default_max_idle_conns(),
            idle_timeout: default_idle_timeout(),
            tcp_keepalive: Duration::from_secs(30),
        }
    }
}

pub(crate) fn default_max_idle_conns() -> usize {
    100
}

pub(crate) fn default_idle_timeout() -> Duration {
    Duration::from_secs(90)
}
