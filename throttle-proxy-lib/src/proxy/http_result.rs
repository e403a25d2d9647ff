use http::StatusCode;
use thiserror::Error;

/// HTTP result type, T is typically a hyper::Response
/// HttpError is used to generate a synthetic error response
pub type HttpResult<T> = std::result::Result<T, HttpError>;

/// Describes things that can go wrong in the forwarder
#[derive(Debug, Error, Clone)]
pub enum HttpError {
    #[error("Failed to generate upstream request for backend: {0}")]
    FailedToGenerateUpstreamRequest(String),

    #[error("Backend unavailable: {0}")]
    BackendUnavailable(String),

    #[error("Backend did not respond within {0:?}")]
    BackendTimeout(std::time::Duration),

    #[error("Invalid URI: {0}")]
    InvalidUri(String),
}

impl HttpError {
    /// Metric label for this error
    pub fn error_type(&self) -> &'static str {
        match self {
            HttpError::FailedToGenerateUpstreamRequest(_) => "upstream_request",
            HttpError::BackendUnavailable(_) => "backend_unavailable",
            HttpError::BackendTimeout(_) => "backend_timeout",
            HttpError::InvalidUri(_) => "invalid_uri",
        }
    }
}

/// Every forwarding failure is reported to the caller as 503; the variant
/// only shows up in logs and the `error_type` label.
impl From<HttpError> for StatusCode {
    fn from(_: HttpError) -> StatusCode {
        StatusCode::SERVICE_UNAVAILABLE
    }
}
