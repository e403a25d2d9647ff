use std::convert::Infallible;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use hyper::body::Incoming;
use hyper::Request;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as ConnBuilder;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::error::{ProxyError, Result};
use crate::proxy::connection::ConnectionGuard;
use crate::proxy::context::ProxyContext;
use crate::proxy::handler::handle_proxy_request;

/// Resolves once `shutdown` holds `true` or its sender is gone.
async fn shutdown_requested(shutdown: &mut watch::Receiver<bool>) {
    let _ = shutdown.wait_for(|stop| *stop).await;
}

/// Bind the configured listen address and serve until shutdown.
pub async fn run(ctx: Arc<ProxyContext>, shutdown: watch::Receiver<bool>) -> Result<()> {
    let addr = ctx.config.listen;
    let listener = TcpListener::bind(addr).await.map_err(ProxyError::Io)?;
    serve(listener, ctx, shutdown).await
}

/// Serve the proxy on an already bound listener.
///
/// Starts the client eviction sweep, accepts connections until `shutdown`
/// flips to `true`, asks open connections to finish gracefully, waits for
/// them up to the configured shutdown timeout and finally stops the sweep.
pub async fn serve(
    listener: TcpListener,
    ctx: Arc<ProxyContext>,
    mut shutdown: watch::Receiver<bool>,
) -> Result<()> {
    let addr = listener.local_addr().map_err(ProxyError::Io)?;
    let builder = ConnBuilder::new(TokioExecutor::new());

    ctx.registry
        .start_eviction(ctx.config.eviction.interval, ctx.metrics.clone());

    let active_connections = Arc::new(AtomicUsize::new(0));
    let (connections_closed_tx, mut connections_closed_rx) = watch::channel(());

    info!(?addr, backend = %ctx.config.backend_url, "Reverse proxy listening");

    loop {
        tokio::select! {
            _ = shutdown_requested(&mut shutdown) => {
                info!("Shutdown requested, no longer accepting connections");
                break;
            }
            result = listener.accept() => {
                let (stream, peer) = match result {
                    Ok((stream, peer)) => (stream, peer),
                    Err(e) => {
                        warn!(error = %e, "accept error");
                        continue;
                    }
                };

                if let Some(ref m) = ctx.metrics {
                    m.connections_total.add(1, &[]);
                }
                let guard = ConnectionGuard::new(
                    Arc::clone(&active_connections),
                    connections_closed_tx.clone(),
                    ctx.metrics.as_ref().map(|m| m.connections_active.clone()),
                );

                let builder = builder.clone();
                let ctx = Arc::clone(&ctx);
                let mut conn_shutdown = shutdown.clone();

                tokio::spawn(async move {
                    let _guard = guard;

                    let svc = hyper::service::service_fn(move |req: Request<Incoming>| {
                        let ctx = Arc::clone(&ctx);
                        async move {
                            Ok::<_, Infallible>(handle_proxy_request(req, &ctx, peer).await)
                        }
                    });

                    let conn = builder.serve_connection(TokioIo::new(stream), svc);
                    tokio::pin!(conn);

                    let result = tokio::select! {
                        res = conn.as_mut() => res,
                        _ = shutdown_requested(&mut conn_shutdown) => {
                            conn.as_mut().graceful_shutdown();
                            conn.as_mut().await
                        }
                    };
                    if let Err(e) = result {
                        debug!(?peer, error = %e, "serve_connection error");
                    }
                });
            }
        }
    }

    drop(listener);

    let shutdown_timeout = ctx.config.timeout.shutdown;
    info!(
        active_connections = active_connections.load(Ordering::Relaxed),
        "Waiting for active connections to finish (timeout: {}s)",
        shutdown_timeout.as_secs()
    );

    let drained = tokio::time::timeout(shutdown_timeout, async {
        while active_connections.load(Ordering::Relaxed) > 0 {
            if connections_closed_rx.changed().await.is_err() {
                break;
            }
        }
    })
    .await;

    match drained {
        Ok(()) => info!("All connections closed"),
        Err(_) => warn!(
            active_connections = active_connections.load(Ordering::Relaxed),
            "Shutdown timeout reached with connections still active"
        ),
    }

    if let Some(handle) = ctx.registry.stop() {
        let _ = handle.await;
    }

    info!("Proxy server stopped");
    Ok(())
}
