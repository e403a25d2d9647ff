//! Per-client rate limiting for Throttle Proxy.
//!
//! Every client gets its own pair of primitives, created lazily on first
//! sight and reclaimed by a background sweep once the client goes quiet:
//!
//! 1. **RequestTracker** (`tracker.rs`): a fixed one-second occupancy window
//!    that answers "how many requests has this client made in the current
//!    second, including this one?".
//!
//! 2. **TokenBucket** (`token_bucket.rs`): a continuous token bucket refilled
//!    at the configured limit, consulted only once the window count is over
//!    the limit.
//!
//! 3. **ClientRegistry** (`registry.rs`): identity -> (tracker, bucket) map
//!    plus the periodic eviction sweep that bounds its memory.
//!
//! 4. **RateLimitManager** (`manager.rs`): the admission policy tying the
//!    three together.
//!
//! # Locking
//!
//! Each tracker and bucket owns its own mutex. The registry lock only guards
//! map lookup, insertion and removal and is released before any per-client
//! arithmetic runs, so unrelated clients never serialize behind each other.
//!
//! # Example Usage
//!
//! ```ignore
//! use throttle_proxy_lib::security::rate_limit::{
//!     ClientRegistry, RateLimitManager, RegistryConfig,
//! };
//!
//! let registry = ClientRegistry::new(RegistryConfig::for_limit(10));
//! let manager = RateLimitManager::new(registry, 10);
//!
//! if manager.check("192.168.1.1").is_limited() {
//!     // Return 429 Too Many Requests
//! }
//! ```

mod identity;
mod manager;
mod registry;
mod token_bucket;
mod tracker;

pub use identity::{resolve_client_identity, REAL_IP, X_FORWARDED_FOR};
pub use manager::{RateLimitManager, RateLimitResult};
pub use registry::{ClientEntry, ClientRegistry, RegistryConfig, MIN_SWEEP_INTERVAL};
pub use token_bucket::TokenBucket;
pub use tracker::{RequestTracker, WINDOW};

use std::sync::{Mutex, MutexGuard, PoisonError};

/// Lock a per-client mutex, recovering the guard if a holder panicked.
///
/// The guarded values are plain counters and timestamps that are never left
/// half-updated across a panic point.
#[inline]
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
