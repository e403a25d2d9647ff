use crate::security::ClientRegistry;
use crate::telemetry::{health_check_response, live_check_response, ready_check_response};
use http::header::{HeaderValue, CONTENT_TYPE};
use http_body_util::{combinators::BoxBody, BodyExt, Full};
use hyper::body::{Bytes, Incoming};
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as ConnBuilder;
use prometheus::{Encoder, Registry, TextEncoder};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{info, warn};

type RespBody = BoxBody<Bytes, hyper::Error>;

fn text_response(status: StatusCode, text: &'static str) -> Response<RespBody> {
    let body = Full::new(Bytes::from(text))
        .map_err(|never| match never {})
        .boxed();
    let mut resp = Response::new(body);
    *resp.status_mut() = status;
    resp
}

/// Prometheus text exposition of everything gathered by `registry`.
fn metrics_response(registry: &Registry) -> Response<RespBody> {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&registry.gather(), &mut buffer) {
        warn!(error = %e, "Observability server: failed to encode metrics");
        return text_response(StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error");
    }

    let body = Full::new(Bytes::from(buffer))
        .map_err(|never| match never {})
        .boxed();
    let mut resp = Response::new(body);
    if let Ok(content_type) = HeaderValue::from_str(encoder.format_type()) {
        resp.headers_mut().insert(CONTENT_TYPE, content_type);
    }
    resp
}

fn route(
    path: &str,
    registry: &Registry,
    clients: &ClientRegistry,
    draining: bool,
) -> Response<RespBody> {
    let result = match path {
        "/health" => health_check_response(),
        "/ready" => ready_check_response(clients.len(), draining),
        "/live" => live_check_response(),
        "/metrics" => return metrics_response(registry),
        _ => return text_response(StatusCode::NOT_FOUND, "Not Found"),
    };
    result.unwrap_or_else(|e| {
        warn!(path, error = %e, "Observability server: failed to build response");
        text_response(StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error")
    })
}

/// Bind `0.0.0.0:port` and serve metrics and health checks until `shutdown`
/// flips to `true`.
pub async fn start_observability_server(
    port: u16,
    registry: Registry,
    clients: Arc<ClientRegistry>,
    shutdown: watch::Receiver<bool>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr).await?;
    serve_observability(listener, registry, clients, shutdown).await
}

/// Serve the observability endpoints on an already bound listener:
/// - `/metrics` - Prometheus metrics
/// - `/health` - Health check endpoint
/// - `/ready` - Readiness check endpoint
/// - `/live` - Liveness check endpoint
pub async fn serve_observability(
    listener: TcpListener,
    registry: Registry,
    clients: Arc<ClientRegistry>,
    mut shutdown: watch::Receiver<bool>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let registry = Arc::new(registry);
    let addr = listener.local_addr()?;

    info!(?addr, "Observability server started (metrics + health checks)");

    loop {
        tokio::select! {
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    info!("Observability server: shutdown requested");
                    break;
                }
            }
            result = listener.accept() => {
                let (stream, peer) = match result {
                    Ok((stream, peer)) => (stream, peer),
                    Err(e) => {
                        warn!(error = %e, "Observability server: accept error");
                        continue;
                    }
                };

                let registry = Arc::clone(&registry);
                let clients = Arc::clone(&clients);
                let shutdown = shutdown.clone();
                tokio::spawn(async move {
                    let svc = hyper::service::service_fn(move |req: Request<Incoming>| {
                        let draining = *shutdown.borrow();
                        let resp = route(req.uri().path(), &registry, &clients, draining);
                        async move { Ok::<_, hyper::Error>(resp) }
                    });

                    let builder = ConnBuilder::new(TokioExecutor::new());
                    if let Err(e) = builder.serve_connection(TokioIo::new(stream), svc).await {
                        warn!(?peer, error = %e, "Observability server: serve_connection error");
                    }
                });
            }
        }
    }

    info!("Observability server stopped");
    Ok(())
}
