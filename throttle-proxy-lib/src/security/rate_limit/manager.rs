use std::sync::Arc;
use std::time::Instant;

use super::ClientRegistry;

/// Result of a rate limit check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitResult {
    /// Request is allowed
    Allowed {
        /// Requests observed in the client's current window, this one included
        observed: u32,
        /// Configured requests per second
        limit: u32,
        /// Whether admission needed a token from the gate
        gate_consulted: bool,
    },
    /// Request exceeds the limit and the gate had no token
    Limited { observed: u32, limit: u32 },
}

impl RateLimitResult {
    pub fn is_allowed(&self) -> bool {
        matches!(self, RateLimitResult::Allowed { .. })
    }

    pub fn is_limited(&self) -> bool {
        matches!(self, RateLimitResult::Limited { .. })
    }

    pub fn observed(&self) -> u32 {
        match *self {
            RateLimitResult::Allowed { observed, .. } => observed,
            RateLimitResult::Limited { observed, .. } => observed,
        }
    }
}

/// Admission policy over the per-client registry.
///
/// Every request is first counted in the client's one-second window. While
/// the count is at or under the limit the request is admitted without
/// touching the gate. Past the limit, the request is admitted only if the
/// gate yields a token.
#[derive(Debug, Clone)]
pub struct RateLimitManager {
    registry: Arc<ClientRegistry>,
    limit: u32,
}

impl RateLimitManager {
    pub fn new(registry: Arc<ClientRegistry>, limit: u32) -> Self {
        Self { registry, limit }
    }

    pub fn check(&self, identity: &str) -> RateLimitResult {
        self.check_at(identity, Instant::now())
    }

    pub fn check_at(&self, identity: &str, now: Instant) -> RateLimitResult {
        let entry = self.registry.get_or_create_at(identity, now);
        let observed = entry.tracker().record_at(now);

        if observed <= self.limit {
            return RateLimitResult::Allowed { observed, limit: self.limit, gate_consulted: false };
        }

        if entry.gate().try_acquire_at(now) {
            RateLimitResult::Allowed { observed, limit: self.limit, gate_consulted: true }
        } else {
            RateLimitResult::Limited { observed, limit: self.limit }
        }
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }

    pub fn registry(&self) -> &Arc<ClientRegistry> {
        &self.registry
    }
}
