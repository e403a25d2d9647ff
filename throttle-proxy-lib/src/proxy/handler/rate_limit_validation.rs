use http_body_util::combinators::BoxBody;
use hyper::Response;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::notify::Notifier;
use crate::proxy::deadline_body::BoxError;
use crate::proxy::synthetic_response::too_many_requests;
use crate::security::{RateLimitManager, RateLimitResult};
use crate::telemetry::Metrics;

type RespBody = BoxBody<bytes::Bytes, BoxError>;

/// Check rate limiting for incoming request.
///
/// Returns:
/// - `None` if request is allowed to proceed
/// - `Some(429 response)` if request exceeds rate limit; a notification has
///   been dispatched in the background by then
pub fn check_rate_limit(
    manager: &RateLimitManager,
    notifier: &Notifier,
    client: &str,
    metrics: Option<&Arc<Metrics>>,
) -> Option<Response<RespBody>> {
    match manager.check(client) {
        RateLimitResult::Limited { observed, limit } => {
            warn!(client, observed, limit, "Rate limit exceeded");

            if let Some(m) = metrics {
                m.record_rate_limit_rejection();
            }

            let response = too_many_requests();
            notifier.spawn_rate_limit_notification(limit, observed, metrics.cloned());
            Some(response)
        }
        RateLimitResult::Allowed { observed, limit, gate_consulted } => {
            debug!(client, observed, limit, gate_consulted, "Rate limit check passed");

            if let Some(m) = metrics {
                m.record_rate_limit_allowed(gate_consulted);
            }

            None
        }
    }
}
