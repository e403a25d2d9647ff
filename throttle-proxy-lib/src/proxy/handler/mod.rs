pub mod rate_limit_validation;
pub mod request;

pub use rate_limit_validation::check_rate_limit;
pub use request::handle_proxy_request;
