#![forbid(unsafe_code)]

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use http::{Response, StatusCode, Uri};
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::service::service_fn;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as ConnBuilder;
use throttle_proxy_lib::config::Config;
use throttle_proxy_lib::{serve, ProxyContext};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

type TestResult = Result<(), Box<dyn std::error::Error + Send + Sync>>;

/// Backend that answers every request with its path and query, echoing the
/// Host and X-Forwarded-For it received as response headers.
async fn start_backend() -> Result<SocketAddr, Box<dyn std::error::Error + Send + Sync>> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;

    tokio::spawn(async move {
        loop {
            let Ok((stream, _)) = listener.accept().await else {
                break;
            };
            tokio::spawn(async move {
                let svc = service_fn(|req: hyper::Request<Incoming>| async move {
                    let pq = req
                        .uri()
                        .path_and_query()
                        .map(|pq| pq.as_str().to_string())
                        .unwrap_or_default();
                    let mut resp = Response::new(Full::new(Bytes::from(pq)));
                    for (from, to) in [("host", "x-seen-host"), ("x-forwarded-for", "x-seen-xff")] {
                        if let Some(v) = req.headers().get(from) {
                            resp.headers_mut().insert(to, v.clone());
                        }
                    }
                    Ok::<_, Infallible>(resp)
                });
                let _ = ConnBuilder::new(TokioExecutor::new())
                    .serve_connection(TokioIo::new(stream), svc)
                    .await;
            });
        }
    });

    Ok(addr)
}

/// Backend that accepts connections and never answers.
async fn start_blackhole() -> Result<SocketAddr, Box<dyn std::error::Error + Send + Sync>> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((stream, _)) = listener.accept().await {
            held.push(stream);
        }
    });
    Ok(addr)
}

/// Backend that sends a response head announcing 100 body bytes, writes a
/// few of them and then stalls.
async fn start_stalled_body_backend() -> Result<SocketAddr, Box<dyn std::error::Error + Send + Sync>>
{
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((mut stream, _)) = listener.accept().await {
            let mut buf = [0u8; 4096];
            let _ = stream.read(&mut buf).await;
            let _ = stream
                .write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 100\r\n\r\npartial")
                .await;
            held.push(stream);
        }
    });
    Ok(addr)
}

/// Webhook receiver forwarding every request body to the returned channel,
/// then answering after `reply_delay`.
async fn start_webhook(
    reply_delay: Duration,
) -> Result<(SocketAddr, mpsc::UnboundedReceiver<serde_json::Value>), Box<dyn std::error::Error + Send + Sync>>
{
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let (tx, rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        loop {
            let Ok((stream, _)) = listener.accept().await else {
                break;
            };
            let tx = tx.clone();
            tokio::spawn(async move {
                let svc = service_fn(move |req: hyper::Request<Incoming>| {
                    let tx = tx.clone();
                    async move {
                        if let Ok(collected) = req.into_body().collect().await {
                            if let Ok(json) = serde_json::from_slice(&collected.to_bytes()) {
                                let _ = tx.send(json);
                            }
                        }
                        tokio::time::sleep(reply_delay).await;
                        Ok::<_, Infallible>(Response::new(Full::new(Bytes::from_static(b"ok"))))
                    }
                });
                let _ = ConnBuilder::new(TokioExecutor::new())
                    .serve_connection(TokioIo::new(stream), svc)
                    .await;
            });
        }
    });

    Ok((addr, rx))
}

struct RunningProxy {
    addr: SocketAddr,
    ctx: Arc<ProxyContext>,
    shutdown: watch::Sender<bool>,
    task: JoinHandle<throttle_proxy_lib::Result<()>>,
}

async fn start_proxy(
    backend: SocketAddr,
    webhook: Option<SocketAddr>,
    proxy_timeout: Duration,
) -> Result<RunningProxy, Box<dyn std::error::Error + Send + Sync>> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;

    let mut config = Config {
        listen: addr,
        backend_url: format!("http://{backend}").parse::<Uri>()?,
        container_id: "test-container".to_string(),
        webhook_url: webhook.map(|w| format!("http://{w}/hook")),
        ..Config::default()
    };
    config.timeout.proxy = proxy_timeout;
    config.timeout.shutdown = Duration::from_secs(2);

    let ctx = Arc::new(ProxyContext::new(Arc::new(config), None)?);
    let (shutdown, shutdown_rx) = watch::channel(false);
    let task = tokio::spawn(serve(listener, Arc::clone(&ctx), shutdown_rx));

    Ok(RunningProxy { addr, ctx, shutdown, task })
}

fn client() -> Result<reqwest::Client, reqwest::Error> {
    reqwest::Client::builder()
        .no_proxy()
        .timeout(Duration::from_secs(10))
        .build()
}

#[tokio::test]
async fn test_admitted_request_is_forwarded_verbatim() -> TestResult {
    let backend = start_backend().await?;
    let proxy = start_proxy(backend, None, Duration::from_secs(5)).await?;

    let resp = client()?
        .get(format!("http://{}/hello/world?x=1&y=2", proxy.addr))
        .header("x-forwarded-for", "203.0.113.5")
        .send()
        .await?;

    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(
        resp.headers().get("x-seen-host").and_then(|v| v.to_str().ok()),
        Some(backend.to_string().as_str())
    );
    assert_eq!(
        resp.headers().get("x-seen-xff").and_then(|v| v.to_str().ok()),
        Some("203.0.113.5, 127.0.0.1")
    );
    assert_eq!(resp.text().await?, "/hello/world?x=1&y=2");

    assert!(proxy.ctx.registry.contains("203.0.113.5"));
    let _ = proxy.shutdown.send(true);
    proxy.task.await??;
    Ok(())
}

#[tokio::test]
async fn test_twelfth_request_is_rejected_and_notified() -> TestResult {
    let backend = start_backend().await?;
    let (webhook, mut notifications) = start_webhook(Duration::ZERO).await?;
    let proxy = start_proxy(backend, Some(webhook), Duration::from_secs(5)).await?;
    let client = client()?;
    let url = format!("http://{}/", proxy.addr);

    let mut statuses = Vec::new();
    let mut rejected_body = None;
    for _ in 0..12 {
        let resp = client
            .get(&url)
            .header("x-forwarded-for", "198.51.100.20")
            .send()
            .await?;
        statuses.push(resp.status());
        if resp.status() == StatusCode::TOO_MANY_REQUESTS {
            rejected_body = Some(resp.text().await?);
        }
    }

    assert!(statuses[..11].iter().all(|s| *s == StatusCode::OK), "{statuses:?}");
    assert_eq!(statuses[11], StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(rejected_body.as_deref(), Some("Too Many Requests\n"));

    let payload = tokio::time::timeout(Duration::from_secs(5), notifications.recv())
        .await?
        .ok_or("webhook channel closed")?;
    assert_eq!(
        payload,
        serde_json::json!({
            "container_id": "test-container",
            "limit_expected_rps": 10,
            "limit_exceeded_rps": 12,
            "message": "Rate limit exceeded"
        })
    );

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(notifications.try_recv().is_err(), "expected exactly one notification");

    let _ = proxy.shutdown.send(true);
    proxy.task.await??;
    Ok(())
}

#[tokio::test]
async fn test_slow_webhook_does_not_delay_rejection() -> TestResult {
    let webhook_delay = Duration::from_secs(5);
    let backend = start_backend().await?;
    let (webhook, mut notifications) = start_webhook(webhook_delay).await?;
    let proxy = start_proxy(backend, Some(webhook), Duration::from_secs(5)).await?;
    let client = client()?;
    let url = format!("http://{}/", proxy.addr);

    for _ in 0..11 {
        let resp = client.get(&url).header("x-real-ip", "198.51.100.30").send().await?;
        assert_eq!(resp.status(), StatusCode::OK);
    }

    let started = std::time::Instant::now();
    let resp = client.get(&url).header("x-real-ip", "198.51.100.30").send().await?;
    let elapsed = started.elapsed();

    assert_eq!(resp.status(), StatusCode::TOO_MANY_REQUESTS);
    assert!(elapsed < Duration::from_secs(1), "429 waited on the webhook: {elapsed:?}");

    // The webhook still receives the payload while it sits on its reply
    let payload = tokio::time::timeout(Duration::from_secs(2), notifications.recv())
        .await?
        .ok_or("webhook channel closed")?;
    assert_eq!(payload["limit_exceeded_rps"], 12);

    let _ = proxy.shutdown.send(true);
    proxy.task.await??;
    Ok(())
}

#[tokio::test]
async fn test_rejection_without_webhook_still_returns_429() -> TestResult {
    let backend = start_backend().await?;
    let proxy = start_proxy(backend, None, Duration::from_secs(5)).await?;
    let client = client()?;

    let mut last = StatusCode::OK;
    for _ in 0..12 {
        last = client
            .get(format!("http://{}/", proxy.addr))
            .header("x-real-ip", "192.0.2.99")
            .send()
            .await?
            .status();
    }
    assert_eq!(last, StatusCode::TOO_MANY_REQUESTS);

    let _ = proxy.shutdown.send(true);
    proxy.task.await??;
    Ok(())
}

#[tokio::test]
async fn test_unresponsive_backend_yields_503_after_timeout() -> TestResult {
    let backend = start_blackhole().await?;
    let timeout = Duration::from_secs(1);
    let proxy = start_proxy(backend, None, timeout).await?;

    let started = std::time::Instant::now();
    let resp = client()?.get(format!("http://{}/slow", proxy.addr)).send().await?;
    let elapsed = started.elapsed();

    assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert!(elapsed >= timeout, "responded before the deadline: {elapsed:?}");
    assert!(elapsed < timeout * 4, "responded long after the deadline: {elapsed:?}");
    assert_eq!(resp.text().await?, "Service Unavailable\n");

    let _ = proxy.shutdown.send(true);
    proxy.task.await??;
    Ok(())
}

#[tokio::test]
async fn test_stalled_response_body_is_cut_at_deadline() -> TestResult {
    let backend = start_stalled_body_backend().await?;
    let timeout = Duration::from_secs(1);
    let proxy = start_proxy(backend, None, timeout).await?;

    let started = std::time::Instant::now();
    let resp = client()?.get(format!("http://{}/download", proxy.addr)).send().await?;
    assert_eq!(resp.status(), StatusCode::OK);

    let body = tokio::time::timeout(timeout * 4, resp.bytes()).await?;
    let elapsed = started.elapsed();

    assert!(body.is_err(), "stalled body completed: {body:?}");
    assert!(elapsed >= timeout, "body aborted before the deadline: {elapsed:?}");
    assert!(elapsed < timeout * 4, "body aborted long after the deadline: {elapsed:?}");

    let _ = proxy.shutdown.send(true);
    proxy.task.await??;
    Ok(())
}

#[tokio::test]
async fn test_unreachable_backend_yields_503() -> TestResult {
    // Bind and drop to get a port nothing listens on
    let closed = {
        let l = std::net::TcpListener::bind("127.0.0.1:0")?;
        l.local_addr()?
    };
    let proxy = start_proxy(closed, None, Duration::from_secs(5)).await?;

    let resp = client()?.get(format!("http://{}/", proxy.addr)).send().await?;
    assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);

    let _ = proxy.shutdown.send(true);
    proxy.task.await??;
    Ok(())
}

#[tokio::test]
async fn test_shutdown_stops_eviction_sweep() -> TestResult {
    let backend = start_backend().await?;
    let proxy = start_proxy(backend, None, Duration::from_secs(5)).await?;

    // serve() starts the sweep before accepting
    let resp = client()?.get(format!("http://{}/", proxy.addr)).send().await?;
    assert_eq!(resp.status(), StatusCode::OK);
    assert!(proxy.ctx.registry.is_sweeping());

    let _ = proxy.shutdown.send(true);
    tokio::time::timeout(Duration::from_secs(5), proxy.task).await???;

    assert!(!proxy.ctx.registry.is_sweeping());
    assert_eq!(proxy.ctx.registry.len(), 1);
    Ok(())
}
