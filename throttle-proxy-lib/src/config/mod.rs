mod backend;
mod loader;
mod timeout;
mod types;
mod validator;

pub use backend::BackendPoolConfig;
pub use loader::{load_dotenv, load_from_env, load_with, vars};
pub use timeout::TimeoutConfig;
pub use types::{
    Config, EvictionConfig, DEFAULT_BACKEND_URL, DEFAULT_CONTAINER_ID, DEFAULT_RATE_LIMIT,
};
pub use validator::{validate_backend_url, validate_webhook_url};
