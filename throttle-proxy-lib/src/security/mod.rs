pub mod rate_limit;

pub use rate_limit::{resolve_client_identity, ClientRegistry, RateLimitManager, RateLimitResult};
