use http::StatusCode;
use hyper::body::Incoming;
use hyper::Request;
use std::net::SocketAddr;
use tokio::time::Instant;
use tracing::warn;

use crate::proxy::connection::InFlightGuard;
use crate::proxy::context::ProxyContext;
use crate::proxy::deadline_body::BoxError;
use crate::proxy::forwarding::{forward, ForwardConfig};
use crate::proxy::handler::rate_limit_validation::check_rate_limit;
use crate::proxy::synthetic_response::synthetic_error_response;
use crate::security::resolve_client_identity;

type RespBody = http_body_util::combinators::BoxBody<bytes::Bytes, BoxError>;

/// Admit or reject one request, then forward admitted ones to the backend.
///
/// Always produces a response: backend failures become synthetic error
/// responses here so the connection stays usable.
pub async fn handle_proxy_request(
    req: Request<Incoming>,
    ctx: &ProxyContext,
    peer: SocketAddr,
) -> hyper::Response<RespBody> {
    let start = Instant::now();
    let method = req.method().to_string();
    let metrics = ctx.metrics.as_ref();

    let client = resolve_client_identity(req.headers(), peer);

    let response = match check_rate_limit(&ctx.rate_limit, &ctx.notifier, &client, metrics) {
        Some(rejected) => rejected,
        None => {
            let path = req.uri().path().to_string();
            let in_flight = InFlightGuard::new(&client, &path);

            let result = forward(
                req,
                ForwardConfig {
                    backend: &ctx.config.backend_url,
                    client_pool: &ctx.client_pool,
                    timeout: ctx.config.timeout.proxy,
                    metrics,
                    peer,
                },
            )
            .await;
            in_flight.complete();

            match result {
                Ok(resp) => resp,
                Err(e) => {
                    warn!(client = %client, path = %path, error = %e, "Proxy error");
                    synthetic_error_response(StatusCode::from(e))
                }
            }
        }
    };

    if let Some(m) = metrics {
        let status_code = response.status().as_u16();
        m.record_request(&method, status_code);
        m.record_request_duration(start.elapsed().as_secs_f64(), &method, status_code);
    }

    response
}
