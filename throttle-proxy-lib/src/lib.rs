#![forbid(unsafe_code)]

pub mod config;
pub mod error;
pub mod notify;
pub mod proxy;
pub mod security;
pub mod telemetry;

pub use config::{load_dotenv, load_from_env, load_with, Config};
pub use error::{ProxyError, Result};
pub use notify::Notifier;
pub use proxy::{run, serve, ProxyContext};
pub use security::{ClientRegistry, RateLimitManager, RateLimitResult};
