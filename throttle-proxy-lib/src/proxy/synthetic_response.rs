use http::header::{HeaderValue, CONTENT_TYPE, X_CONTENT_TYPE_OPTIONS};
use http::StatusCode;
use http_body_util::{combinators::BoxBody, BodyExt, Full};
use hyper::body::Bytes;
use hyper::Response;

use crate::proxy::deadline_body::BoxError;

type RespBody = BoxBody<Bytes, BoxError>;

/// Build a plain text 4xx/5xx response whose body is the status reason
/// phrase followed by a newline, e.g. `Too Many Requests\n`.
pub(crate) fn synthetic_error_response(status_code: StatusCode) -> Response<RespBody> {
    let reason = status_code.canonical_reason().unwrap_or("Error");
    let body = Full::new(Bytes::from(format!("{reason}\n")))
        .map_err(|never| match never {})
        .boxed();

    let mut resp = Response::new(body);
    *resp.status_mut() = status_code;
    resp.headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("text/plain; charset=utf-8"));
    resp.headers_mut()
        .insert(X_CONTENT_TYPE_OPTIONS, HeaderValue::from_static("nosniff"));
    resp
}

pub(crate) fn too_many_requests() -> Response<RespBody> {
    synthetic_error_response(StatusCode::TOO_MANY_REQUESTS)
}
