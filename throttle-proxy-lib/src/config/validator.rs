use http::Uri;

use crate::error::{ProxyError, Result};

/// Parse and check the backend target.
///
/// The backend must be an absolute `http://` URL with a host. Backend TLS is
/// not supported, so `https://` targets are rejected at startup instead of
/// failing every forwarded request.
pub fn validate_backend_url(raw: &str) -> Result<Uri> {
    let uri: Uri = raw
        .parse()
        .map_err(|e| ProxyError::Config(format!("Invalid backend URL '{raw}': {e}")))?;

    match uri.scheme_str() {
        Some("http") => {}
        Some("https") => {
            return Err(ProxyError::Config(format!(
                "Backend URL '{raw}' uses https, only http backends are supported"
            )));
        }
        Some(other) => {
            return Err(ProxyError::Config(format!(
                "Backend URL '{raw}' has unsupported scheme '{other}'"
            )));
        }
        None => {
            return Err(ProxyError::Config(format!("Backend URL '{raw}' must include a scheme")));
        }
    }

    if uri.authority().is_none() {
        return Err(ProxyError::Config(format!("Backend URL '{raw}' must include a host")));
    }

    Ok(uri)
}

/// Check that a notification target is an absolute http(s) URL.
pub fn validate_webhook_url(raw: &str) -> Result<()> {
    let url = reqwest::Url::parse(raw)
        .map_err(|e| ProxyError::Config(format!("Invalid webhook URL '{raw}': {e}")))?;

    if !matches!(url.scheme(), "http" | "https") {
        return Err(ProxyError::Config(format!(
            "Webhook URL '{raw}' has unsupported scheme '{}'",
            url.scheme()
        )));
    }
    if url.host_str().is_none() {
        return Err(ProxyError::Config(format!("Webhook URL '{raw}' must include a host")));
    }

    Ok(())
}
