//! Upstream client.
//!
//! # Responsibilities
//! - Abstract the network round trip behind [`NetworkExecutor`]
//! - Bound each round trip, and each wait for a body chunk, with the
//!   configured deadline
//! - Hand back the upstream response with its body still streaming
//!
//! # Design Decisions
//! - The executor is injected, so the relay core does not depend on a
//!   particular HTTP client
//! - Redirects are relayed to the caller, never followed
//! - Bodies are neither buffered nor decompressed

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{HeaderMap, Request, StatusCode, Uri};
use hyper_rustls::{HttpsConnector, HttpsConnectorBuilder};
use hyper_util::client::legacy::{connect::HttpConnector, Client};
use hyper_util::rt::TokioExecutor;

use crate::error::{BoxError, RelayError};
use crate::http::request::{OutboundRequest, RequestContext};
use crate::resilience::{with_deadline, with_idle_deadline};

/// Response head from the upstream with an open body stream.
#[derive(Debug)]
pub struct UpstreamResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Body,
}

/// Capability that performs one HTTP round trip.
///
/// Completes once the response head is received; the body is read later
/// from [`UpstreamResponse::body`].
#[async_trait]
pub trait NetworkExecutor: Send + Sync {
    async fn execute(&self, request: OutboundRequest) -> Result<UpstreamResponse, BoxError>;
}

type UpstreamClient = Client<HttpsConnector<HttpConnector>, Body>;

/// [`NetworkExecutor`] backed by a pooled `hyper` client.
///
/// The client adds nothing beyond `Host` and body framing, so the upstream
/// sees exactly the headers the request carries.
#[derive(Debug, Clone)]
pub struct HyperExecutor {
    client: UpstreamClient,
}

impl HyperExecutor {
    pub fn new() -> Self {
        let connector = HttpsConnectorBuilder::new()
            .with_webpki_roots()
            .https_or_http()
            .enable_http1()
            .build();
        let client = Client::builder(TokioExecutor::new()).build(connector);
        Self { client }
    }

    pub fn with_client(client: UpstreamClient) -> Self {
        Self { client }
    }
}

impl Default for HyperExecutor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl NetworkExecutor for HyperExecutor {
    async fn execute(&self, request: OutboundRequest) -> Result<UpstreamResponse, BoxError> {
        let OutboundRequest {
            method,
            url,
            headers,
            body,
        } = request;

        let uri: Uri = url.as_str().parse()?;
        // The body goes through as-is; hyper frames it from its size hint.
        let mut outbound = Request::builder().method(method).uri(uri).body(body)?;
        *outbound.headers_mut() = headers;

        let (parts, body) = self.client.request(outbound).await?.into_parts();
        Ok(UpstreamResponse {
            status: parts.status,
            headers: parts.headers,
            body: Body::new(body),
        })
    }
}

/// Sends outbound requests to the upstream with an enforced deadline.
#[derive(Clone)]
pub struct Forwarder {
    executor: Arc<dyn NetworkExecutor>,
    timeout: Duration,
}

impl Forwarder {
    pub fn new(executor: Arc<dyn NetworkExecutor>, timeout: Duration) -> Self {
        Self { executor, timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Perform the round trip. Connection failures, DNS failures and a
    /// missing response head after the deadline all become
    /// [`RelayError::UpstreamUnavailable`].
    ///
    /// The returned body is bounded too: it fails if the upstream goes
    /// silent for longer than the same deadline between two chunks.
    pub async fn forward(
        &self,
        ctx: &RequestContext,
        request: OutboundRequest,
    ) -> Result<UpstreamResponse, RelayError> {
        tracing::debug!(
            request_id = %ctx.request_id,
            method = %request.method,
            upstream_url = %request.url,
            timeout = ?self.timeout,
            "Forwarding request upstream"
        );

        let UpstreamResponse {
            status,
            headers,
            body,
        } = with_deadline(self.timeout, self.executor.execute(request)).await?;
        let body = Body::from_stream(with_idle_deadline(self.timeout, body.into_data_stream()));

        tracing::debug!(
            request_id = %ctx.request_id,
            status = %status,
            elapsed = ?ctx.elapsed(),
            "Upstream responded"
        );
        Ok(UpstreamResponse {
            status,
            headers,
            body,
        })
    }
}

impl std::fmt::Debug for Forwarder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Forwarder")
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}
