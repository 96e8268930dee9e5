//! HTTP reverse proxy to agents and allow-listed upstreams.
//!
//! Two entry points share one forwarding primitive:
//!
//! - [`proxy_to_agent`] resolves the agent through the gate and keeps the
//!   inbound path and query, swapping only scheme and authority.
//! - [`proxy_playground`] takes the full target URL from the
//!   `X-Apihub-Proxy-Url` header and replaces the inbound path and query
//!   entirely.
//!
//! Both check the target host against the allow-list before any outbound
//! connection is made.

use axum::{
    body::{Body, HttpBody},
    extract::{Path, State},
    http::{HeaderValue, Request, Uri, header::HOST},
    response::Response,
};
use futures::TryStreamExt;
use log::{debug, error, warn};
use reqwest::{Client, Url};
use serde::Deserialize;

use super::error::{ApiError, ApiResult};
use super::state::AppState;

/// Header naming the upstream URL for the playground proxy.
pub const PROXY_URL_HEADER: &str = "x-apihub-proxy-url";

#[derive(Debug, Deserialize)]
pub struct AgentProxyPath {
    agent_id: String,
}

/// Proxy a request to a registered agent.
///
/// Mounted under a prefix that the router strips, so the request URI seen
/// here is the agent-relative path. It is forwarded verbatim, together with
/// the query, all headers and the body.
pub async fn proxy_to_agent(
    State(state): State<AppState>,
    Path(AgentProxyPath { agent_id }): Path<AgentProxyPath>,
    req: Request<Body>,
) -> ApiResult<Response> {
    let agent = state.gate.resolve(&agent_id).await?;

    let agent_url = Url::parse(&agent.agent_url).map_err(|e| ApiError::InvalidAgentUrl {
        url: agent.agent_url.clone(),
        agent_id: agent_id.clone(),
        debug: e.to_string(),
    })?;

    let host = authority(&agent_url);
    if !state.allow_list.is_host_allowed(&host).await {
        warn!("Agent {} host {} is not in the allow-list", agent_id, host);
        return Err(ApiError::HostNotAllowed { host });
    }

    let upstream = agent_target(&agent_url, req.uri());
    forward(&state.http_client, req, upstream).await
}

/// Proxy a request to the URL given in `X-Apihub-Proxy-Url`.
///
/// The inbound path and query are discarded; the header URL is used as is.
/// The header itself is never forwarded.
pub async fn proxy_playground(
    State(state): State<AppState>,
    mut req: Request<Body>,
) -> ApiResult<Response> {
    let missing = || ApiError::RequiredParamsMissing {
        params: "X-Apihub-Proxy-Url".to_string(),
    };

    let raw = req.headers_mut().remove(PROXY_URL_HEADER).ok_or_else(missing)?;
    if raw.is_empty() {
        return Err(missing());
    }
    let raw = raw.to_str().map_err(|e| ApiError::InvalidUrl {
        url: String::from_utf8_lossy(raw.as_bytes()).into_owned(),
        debug: e.to_string(),
    })?;

    let upstream = Url::parse(raw).map_err(|e| ApiError::InvalidUrl {
        url: raw.to_string(),
        debug: e.to_string(),
    })?;

    let host = authority(&upstream);
    if !state.allow_list.is_host_allowed(&host).await {
        warn!("Playground target host {} is not in the allow-list", host);
        return Err(ApiError::HostNotAllowed { host });
    }

    forward(&state.http_client, req, upstream).await
}

/// Forward a request upstream and stream the response back.
///
/// Sets the `Host` header to the upstream authority and leaves every other
/// header and the body untouched. The response body is streamed; dropping it
/// (for example on client disconnect) closes the upstream connection.
pub async fn forward(client: &Client, req: Request<Body>, upstream: Url) -> ApiResult<Response> {
    let (mut parts, body) = req.into_parts();

    let host = authority(&upstream);
    let host_value = HeaderValue::from_str(&host).map_err(|e| ApiError::InvalidUrl {
        url: upstream.to_string(),
        debug: e.to_string(),
    })?;
    parts.headers.insert(HOST, host_value);

    debug!("Proxying {} request to {}", parts.method, upstream);

    let mut outbound = client
        .request(parts.method, upstream.clone())
        .headers(parts.headers);
    if body.size_hint().exact() != Some(0) {
        outbound = outbound.body(reqwest::Body::wrap_stream(body.into_data_stream()));
    }

    let response = outbound.send().await.map_err(|e| {
        error!("Proxy request to {} failed: {:?}", upstream, e);
        ApiError::ProxyFailed {
            url: upstream.to_string(),
            debug: e.to_string(),
        }
    })?;

    let mut builder = Response::builder().status(response.status());
    if let Some(headers) = builder.headers_mut() {
        for (name, value) in response.headers() {
            headers.append(name, value.clone());
        }
    }

    let url = upstream.to_string();
    let stream = response.bytes_stream().inspect_err(move |e| {
        warn!("Upstream body from {} ended early: {}", url, e);
    });

    builder
        .body(Body::from_stream(stream))
        .map_err(|e| ApiError::internal(format!("failed to build proxy response: {}", e)))
}

/// `host[:port]` of a URL; empty when the URL has no host.
///
/// URL parsing normalizes away a port equal to the scheme default, so
/// `https://h:443` yields `h`. The allow-list check and the outbound `Host`
/// header both see the bare host in that case; an entry written as `h:443`
/// will not match it.
fn authority(url: &Url) -> String {
    match (url.host_str(), url.port()) {
        (Some(host), Some(port)) => format!("{}:{}", host, port),
        (Some(host), None) => host.to_string(),
        (None, _) => String::new(),
    }
}

/// Scheme and authority of the agent, path and query of the inbound request.
fn agent_target(agent_url: &Url, inbound: &Uri) -> Url {
    let mut target = agent_url.clone();
    target.set_path(inbound.path());
    target.set_query(inbound.query());
    target
}
