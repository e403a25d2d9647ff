use http::HeaderMap;
use std::net::SocketAddr;

pub const X_FORWARDED_FOR: &str = "x-forwarded-for";
pub const REAL_IP: &str = "x-real-ip";

/// Resolve the key a request is rate limited under.
///
/// Precedence:
/// 1. `X-Forwarded-For`, used verbatim (a comma-separated chain is one key)
/// 2. `X-Real-IP`
/// 3. the peer IP address, without port
///
/// Empty header values are skipped. Both headers are client-controlled; the
/// proxy is expected to sit behind a trusted edge that sets them.
pub fn resolve_client_identity(headers: &HeaderMap, peer: SocketAddr) -> String {
    header_value(headers, X_FORWARDED_FOR)
        .or_else(|| header_value(headers, REAL_IP))
        .unwrap_or_else(|| peer.ip().to_string())
}

fn header_value(headers: &HeaderMap, name: &str) -> Option<String> {
    let value = headers.get(name)?;
    if value.is_empty() {
        return None;
    }
    Some(String::from_utf8_lossy(value.as_bytes()).into_owned())
}
