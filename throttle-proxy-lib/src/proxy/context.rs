use std::sync::Arc;

use crate::config::Config;
use crate::error::Result;
use crate::notify::Notifier;
use crate::proxy::client_pool::ClientPool;
use crate::security::rate_limit::{ClientRegistry, RegistryConfig};
use crate::security::RateLimitManager;
use crate::telemetry::Metrics;

/// Everything a request handler needs, built once at startup and shared by
/// all connections.
pub struct ProxyContext {
    pub config: Arc<Config>,
    pub registry: Arc<ClientRegistry>,
    pub rate_limit: RateLimitManager,
    pub notifier: Notifier,
    pub client_pool: ClientPool,
    pub metrics: Option<Arc<Metrics>>,
}

impl ProxyContext {
    /// Build the context. The eviction sweep is not started here; see
    /// [`crate::proxy::run`].
    pub fn new(config: Arc<Config>, metrics: Option<Arc<Metrics>>) -> Result<Self> {
        let registry = ClientRegistry::new(
            RegistryConfig::for_limit(config.rate_limit)
                .with_staleness_threshold(config.eviction.staleness_threshold),
        );
        let rate_limit = RateLimitManager::new(Arc::clone(&registry), config.rate_limit);
        let notifier = Notifier::new(config.webhook_url.as_deref(), &config.container_id)?;
        let client_pool = ClientPool::new(&config.backend_pool, &config.timeout);

        Ok(Self { config, registry, rate_limit, notifier, client_pool, metrics })
    }
}
