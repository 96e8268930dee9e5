//! Agent registry handlers: keepalive ingestion and read queries.

use std::collections::HashMap;

use axum::{
    Json,
    body::Bytes,
    extract::{Path, Query, State, rejection::BytesRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use serde_json::Value;
use tracing::{info, instrument};

use crate::agent::{AgentRecord, KeepaliveMessage, VersionResponse};
use crate::context::RequestContext;

use super::error::{ApiError, ApiResult};
use super::state::AppState;

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// Health check endpoint.
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Accept a keepalive from an agent.
///
/// The body must decode as a `KeepaliveMessage` and pass validation;
/// the registry's version token is echoed back.
#[instrument(skip(state, body))]
pub async fn ingest_keepalive(
    State(state): State<AppState>,
    body: Result<Bytes, BytesRejection>,
) -> ApiResult<Json<VersionResponse>> {
    let body = body.map_err(ApiError::bad_request_body)?;
    let message: KeepaliveMessage =
        serde_json::from_slice(&body).map_err(ApiError::bad_request_body)?;
    message.validate().map_err(ApiError::bad_request_body)?;

    let agent_id = message.agent_id();
    let version = state.registry.process_keepalive(message).await?;
    info!(agent_id = %agent_id, "Processed keepalive");
    Ok(Json(VersionResponse { version }))
}

/// List registered agents.
///
/// Query parameters: `onlyActive` (default `true`) and `showIncompatible`
/// (default `false`).
#[instrument(skip(state))]
pub async fn list_agents(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> ApiResult<Json<Vec<AgentRecord>>> {
    let only_active = bool_param(&params, "onlyActive", true)?;
    let show_incompatible = bool_param(&params, "showIncompatible", false)?;

    let agents = state
        .registry
        .list_agents(only_active, show_incompatible)
        .await?;
    info!(count = agents.len(), "Listed agents");
    Ok(Json(agents))
}

/// Get a single agent record. An unknown agent yields an empty 404.
#[instrument(skip(state))]
pub async fn get_agent(
    State(state): State<AppState>,
    Path(agent_id): Path<String>,
) -> ApiResult<Response> {
    match state.registry.get_agent(&agent_id).await? {
        Some(agent) => Ok(Json(agent).into_response()),
        None => Ok(StatusCode::NOT_FOUND.into_response()),
    }
}

/// List namespaces visible to an agent.
#[instrument(skip(state, ctx), fields(request_id = %ctx.request_id))]
pub async fn get_agent_namespaces(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path(agent_id): Path<String>,
) -> ApiResult<Json<Value>> {
    let agent = state.gate.resolve(&agent_id).await?;
    let namespaces = state
        .agent_client
        .get_namespaces(&ctx, &agent.agent_url)
        .await?;
    Ok(Json(namespaces))
}

/// List service names in one namespace of an agent.
#[instrument(skip(state, ctx), fields(request_id = %ctx.request_id))]
pub async fn list_service_names(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path((agent_id, namespace)): Path<(String, String)>,
) -> ApiResult<Json<Value>> {
    let agent = state.gate.resolve(&agent_id).await?;
    let services = state
        .agent_client
        .list_service_names(&ctx, &agent.agent_url, &namespace)
        .await?;
    Ok(Json(services))
}

fn bool_param(params: &HashMap<String, String>, name: &str, default: bool) -> ApiResult<bool> {
    match params.get(name) {
        None => Ok(default),
        Some(raw) => parse_bool(raw).ok_or_else(|| ApiError::IncorrectParamType {
            param: name.to_string(),
            expected: "boolean",
            debug: format!("invalid boolean value '{}'", raw),
        }),
    }
}

/// Accepts `1 t T TRUE true True` and `0 f F FALSE false False`.
fn parse_bool(raw: &str) -> Option<bool> {
    match raw {
        "1" | "t" | "T" | "TRUE" | "true" | "True" => Some(true),
        "0" | "f" | "F" | "FALSE" | "false" | "False" => Some(false),
        _ => None,
    }
}
