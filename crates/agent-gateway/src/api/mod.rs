//! HTTP API module.
//!
//! Registry front-end endpoints and the agent and playground proxies.

mod error;
mod handlers;
mod proxy;
mod routes;
mod state;

pub use error::{ApiError, ApiResult, ErrorResponse};
pub use proxy::PROXY_URL_HEADER;
pub use routes::create_router;
pub use state::{AppState, ProxyClientConfig, build_http_client};
