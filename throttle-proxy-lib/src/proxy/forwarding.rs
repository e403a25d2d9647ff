use crate::proxy::client_pool::ClientPool;
use crate::proxy::deadline_body::{BoxError, DeadlineBody};
use crate::proxy::http_result::{HttpError, HttpResult};
use crate::telemetry::Metrics;
use http::header::{self, HeaderMap, HeaderName, HeaderValue};
use http::uri::{PathAndQuery, Uri};
use http::{Request, Response, Version};
use http_body_util::{combinators::BoxBody, BodyExt};
use hyper::body::Incoming;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

type RespBody = BoxBody<bytes::Bytes, BoxError>;

/// Headers that apply to a single transport hop and are never forwarded
const HOP_HEADERS: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-connection",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

pub struct ForwardConfig<'a> {
    pub backend: &'a Uri,
    pub client_pool: &'a ClientPool,
    pub timeout: Duration,
    pub metrics: Option<&'a Arc<Metrics>>,
    pub peer: SocketAddr,
}

/// Join two URL paths with exactly one slash between them.
pub fn join_paths(base: &str, path: &str) -> String {
    match (base.ends_with('/'), path.starts_with('/')) {
        (true, true) => format!("{base}{}", &path[1..]),
        (false, false) => format!("{base}/{path}"),
        _ => format!("{base}{path}"),
    }
}

/// Rewrite an inbound request URI onto the backend: backend scheme and
/// authority, backend base path joined with the request path, and the
/// backend query (if any) followed by the request query.
pub fn build_backend_uri(backend: &Uri, request: &Uri) -> HttpResult<Uri> {
    let path = join_paths(backend.path(), request.path());

    let query = match (backend.query(), request.query()) {
        (Some(b), Some(r)) if !b.is_empty() && !r.is_empty() => Some(format!("{b}&{r}")),
        (Some(b), _) if !b.is_empty() => Some(b.to_string()),
        (_, Some(r)) if !r.is_empty() => Some(r.to_string()),
        _ => None,
    };

    let pq = match query {
        Some(q) => format!("{path}?{q}"),
        None => path,
    };
    let pq = PathAndQuery::try_from(pq).map_err(|e| HttpError::InvalidUri(e.to_string()))?;

    let mut parts = backend.clone().into_parts();
    parts.path_and_query = Some(pq);
    Uri::from_parts(parts).map_err(|e| HttpError::InvalidUri(e.to_string()))
}

/// Strip hop-by-hop headers, including any listed in `Connection`.
pub fn remove_hop_headers(headers: &mut HeaderMap) {
    let listed: Vec<HeaderName> = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .filter_map(|name| HeaderName::from_bytes(name.trim().as_bytes()).ok())
        .collect();

    for name in listed {
        headers.remove(name);
    }
    for name in HOP_HEADERS {
        headers.remove(*name);
    }
}

/// Append the peer IP to `X-Forwarded-For`, creating it if missing.
/// Multiple existing headers are folded into one comma separated value.
pub fn append_forwarded_for(headers: &mut HeaderMap, peer: SocketAddr) {
    let client_ip = peer.ip().to_string();
    let prior: Vec<&str> = headers
        .get_all("x-forwarded-for")
        .iter()
        .filter_map(|v| v.to_str().ok())
        .collect();

    let value = if prior.is_empty() {
        client_ip
    } else {
        format!("{}, {client_ip}", prior.join(", "))
    };

    if let Ok(hv) = HeaderValue::from_str(&value) {
        headers.insert("x-forwarded-for", hv);
    }
}

/// Forward one admitted request to the backend.
///
/// One deadline covers the whole exchange. Missing it before the response
/// head, or any transport failure, is reported as an [`HttpError`] that maps
/// to 503; there is no retry. Past the head, both bodies are aborted at the
/// same deadline.
pub async fn forward(
    req: Request<Incoming>,
    config: ForwardConfig<'_>,
) -> HttpResult<Response<RespBody>> {
    let start = Instant::now();
    let deadline = start + config.timeout;
    let (mut parts, body) = req.into_parts();

    parts.uri = build_backend_uri(config.backend, &parts.uri)?;
    parts.version = Version::HTTP_11;

    remove_hop_headers(&mut parts.headers);
    append_forwarded_for(&mut parts.headers, config.peer);

    let authority = config.backend.authority().ok_or_else(|| {
        HttpError::FailedToGenerateUpstreamRequest("backend has no authority".into())
    })?;
    let host = HeaderValue::from_str(authority.as_str())
        .map_err(|e| HttpError::FailedToGenerateUpstreamRequest(e.to_string()))?;
    parts.headers.insert(header::HOST, host);

    debug!(uri = %parts.uri, method = %parts.method, "Forwarding request");
    let out_req = Request::from_parts(parts, DeadlineBody::new(body, deadline, config.timeout));

    let result =
        tokio::time::timeout_at(deadline, config.client_pool.client().request(out_req)).await;

    let result = match result {
        Ok(Ok(resp)) => Ok(resp),
        Ok(Err(e)) => Err(HttpError::BackendUnavailable(e.to_string())),
        Err(_) => Err(HttpError::BackendTimeout(config.timeout)),
    };

    match result {
        Ok(mut resp) => {
            remove_hop_headers(resp.headers_mut());
            if let Some(m) = config.metrics {
                m.record_backend_duration(start.elapsed().as_secs_f64(), resp.status().as_u16());
            }
            Ok(resp.map(|b| DeadlineBody::new(b, deadline, config.timeout).boxed()))
        }
        Err(error) => {
            if let Some(m) = config.metrics {
                m.record_backend_error(error.error_type());
            }
            Err(error)
        }
    }
}
