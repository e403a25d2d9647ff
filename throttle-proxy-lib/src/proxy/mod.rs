pub mod client_pool;
pub mod connection;
pub mod context;
pub mod deadline_body;
pub mod forwarding;
pub mod handler;
pub mod http_result;
pub mod server;
pub mod synthetic_response;

pub use client_pool::ClientPool;
pub use context::ProxyContext;
pub use deadline_body::DeadlineBody;
pub use forwarding::{append_forwarded_for, build_backend_uri, join_paths, remove_hop_headers};
pub use http_result::HttpError;
pub use server::{run, serve};
