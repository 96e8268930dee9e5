//! API route definitions.

use axum::{
    Router,
    routing::{any, get},
};
use tower_http::trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer};
use tracing::Level;

use super::handlers;
use super::proxy;
use super::state::AppState;

/// Create the application router.
pub fn create_router(state: AppState) -> Router {
    // Tracing layer with request IDs and timing
    let trace_layer = TraceLayer::new_for_http()
        .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
        .on_request(DefaultOnRequest::new().level(Level::INFO))
        .on_response(DefaultOnResponse::new().level(Level::INFO));

    // Agent proxy sees only the path below `/proxy`
    let agent_proxy = Router::new()
        .route("/", any(proxy::proxy_to_agent))
        .route("/{*path}", any(proxy::proxy_to_agent));

    let api_routes = Router::new()
        // Registry front-end
        .route(
            "/agents",
            get(handlers::list_agents).post(handlers::ingest_keepalive),
        )
        .route("/agents/{agent_id}", get(handlers::get_agent))
        .route(
            "/agents/{agent_id}/namespaces",
            get(handlers::get_agent_namespaces),
        )
        .route(
            "/agents/{agent_id}/namespaces/{namespace}/serviceNames",
            get(handlers::list_service_names),
        )
        .nest("/agents/{agent_id}/proxy", agent_proxy)
        // Header-addressed proxy
        .route("/playground/proxy", any(proxy::proxy_playground))
        .route("/playground/proxy/{*path}", any(proxy::proxy_playground));

    Router::new()
        .route("/health", get(handlers::health))
        .nest("/api/v2", api_routes)
        .layer(trace_layer)
        .with_state(state)
}
