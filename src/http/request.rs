//! Request handling and transformation.
//!
//! # Responsibilities
//! - Carry a per-request context (request ID, method, path, start time)
//! - Capture the inbound request without buffering its body
//! - Rewrite it into the request sent to the upstream
//!
//! # Design Decisions
//! - Request ID assigned as early as possible for tracing
//! - The body stream is moved into the outbound request, never copied
//! - Only whitelisted headers are forwarded

use std::fmt;
use std::time::{Duration, Instant};

use axum::body::Body;
use axum::http::{HeaderMap, Method, Request};
use url::Url;
use uuid::Uuid;

use crate::error::RelayError;
use crate::routing::ForwardTarget;
use crate::security::HeaderWhitelist;

/// Unique identifier for a relayed request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RequestId(Uuid);

impl RequestId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Per-request context threaded through every stage of the relay.
///
/// Created when the request arrives and dropped when its handling ends.
/// Never shared between requests.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub request_id: RequestId,
    pub method: Method,
    pub path: String,
    started: Instant,
}

impl RequestContext {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            request_id: RequestId::new(),
            method,
            path: path.into(),
            started: Instant::now(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }
}

/// An inbound request as received from the client.
#[derive(Debug)]
pub struct IncomingRequest {
    pub method: Method,
    pub path: String,
    pub headers: HeaderMap,
    pub body: Body,
}

impl IncomingRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            headers: HeaderMap::new(),
            body: Body::empty(),
        }
    }

    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    pub fn with_body(mut self, body: impl Into<Body>) -> Self {
        self.body = body.into();
        self
    }

    pub fn context(&self) -> RequestContext {
        RequestContext::new(self.method.clone(), self.path.clone())
    }
}

impl From<Request<Body>> for IncomingRequest {
    fn from(request: Request<Body>) -> Self {
        let (parts, body) = request.into_parts();
        Self {
            method: parts.method,
            path: parts.uri.path().to_string(),
            headers: parts.headers,
            body,
        }
    }
}

/// The request sent to the upstream.
#[derive(Debug)]
pub struct OutboundRequest {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
    pub body: Body,
}

/// Rewrite an inbound request so it targets the upstream.
///
/// Same method; URL is the target with the request path joined onto its
/// path; headers restricted to `whitelist`; body moved through untouched.
pub fn transform_request(
    ctx: &RequestContext,
    incoming: IncomingRequest,
    target: &ForwardTarget,
    whitelist: &HeaderWhitelist,
) -> Result<OutboundRequest, RelayError> {
    let url = target.resolve(&incoming.path)?;
    let headers = whitelist.filter(&incoming.headers);

    tracing::trace!(
        request_id = %ctx.request_id,
        upstream_url = %url,
        forwarded_headers = headers.len(),
        dropped_headers = incoming.headers.len().saturating_sub(headers.len()),
        "Request transformed"
    );

    Ok(OutboundRequest {
        method: incoming.method,
        url,
        headers,
        body: incoming.body,
    })
}
