use crate::config::{BackendPoolConfig, TimeoutConfig};
use crate::proxy::deadline_body::DeadlineBody;
use hyper::body::Incoming;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use std::sync::Arc;

pub type HttpClient = Client<HttpConnector, DeadlineBody<Incoming>>;

/// Shared HTTP client pool for backend connections
///
/// Every admitted request goes to the same backend, so one HTTP/1.1 client
/// with keep-alive pooling serves the whole process.
#[derive(Clone)]
pub struct ClientPool {
    http11: Arc<HttpClient>,
}

impl ClientPool {
    pub fn new(config: &BackendPoolConfig, timeout: &TimeoutConfig) -> Self {
        Self { http11: Arc::new(Self::create_http11_client(config, timeout)) }
    }

    fn create_http11_client(config: &BackendPoolConfig, timeout: &TimeoutConfig) -> HttpClient {
        let mut connector = HttpConnector::new();
        connector.set_keepalive(Some(config.tcp_keepalive));
        connector.set_connect_timeout(Some(timeout.connect));
        connector.set_nodelay(true);

        let mut builder = Client::builder(TokioExecutor::new());
        builder.pool_idle_timeout(config.idle_timeout);

        // 0 keeps the builder default (unbounded)
        if config.max_idle_conns > 0 {
            builder.pool_max_idle_per_host(config.max_idle_conns);
        }

        builder.build(connector)
    }

    pub fn client(&self) -> &HttpClient {
        &self.http11
    }
}
