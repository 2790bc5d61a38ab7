//! HTTP surface of the proxy: the remote-read endpoint plus health and
//! metrics endpoints.

mod handlers;
mod http;
mod middleware;

pub use handlers::{ApiError, AppState};
pub use http::{ProxyServer, build_router};
