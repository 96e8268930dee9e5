//! Per-request context forwarded to agents.

use std::convert::Infallible;

use axum::{
    extract::FromRequestParts,
    http::{
        HeaderMap, HeaderValue,
        header::{AUTHORIZATION, COOKIE},
        request::Parts,
    },
};

/// Correlation id header, read from the caller and forwarded to agents.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Caller identity and correlation data for agent client calls.
///
/// Cancellation is not carried explicitly: the handler future owns every
/// agent call, and hyper drops it when the client disconnects.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub request_id: String,
    pub authorization: Option<HeaderValue>,
    pub cookie: Option<HeaderValue>,
}

impl RequestContext {
    /// Build a context from inbound headers, generating a request id if the
    /// caller did not send one.
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let request_id = headers
            .get(REQUEST_ID_HEADER)
            .and_then(|value| value.to_str().ok())
            .filter(|value| !value.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

        Self {
            request_id,
            authorization: headers.get(AUTHORIZATION).cloned(),
            cookie: headers.get(COOKIE).cloned(),
        }
    }

    /// Attach the context headers to an outbound agent request.
    pub fn apply(&self, mut builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        builder = builder.header(REQUEST_ID_HEADER, &self.request_id);
        if let Some(ref authorization) = self.authorization {
            builder = builder.header(AUTHORIZATION, authorization.clone());
        }
        if let Some(ref cookie) = self.cookie {
            builder = builder.header(COOKIE, cookie.clone());
        }
        builder
    }
}

impl<S> FromRequestParts<S> for RequestContext
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Self::from_headers(&parts.headers))
    }
}
