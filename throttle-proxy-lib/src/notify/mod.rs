//! Outbound notifications for rate limit violations.

mod webhook;

pub use webhook::{
    NotifyError, NotifyOutcome, Notifier, RateLimitPayload, NOTIFY_TIMEOUT, RATE_LIMIT_MESSAGE,
};
