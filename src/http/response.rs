//! Response relay.
//!
//! # Responsibilities
//! - Copy the upstream status, whitelisted headers and body to the client
//! - Stream the body chunk by chunk without buffering it
//! - Write plain-text error responses for failures before the relay starts
//!
//! # Design Decisions
//! - Sinks follow a commit protocol: headers, then status, then body
//! - Once committed, status and headers are final; a failure mid-body can
//!   only stop the copy and be reported

use async_trait::async_trait;
use axum::body::Bytes;
use axum::http::header::{HeaderMap, HeaderValue, CONTENT_TYPE, X_CONTENT_TYPE_OPTIONS};
use axum::http::StatusCode;
use futures_util::StreamExt;

use crate::error::{RelayError, SinkError};
use crate::http::client::UpstreamResponse;
use crate::http::request::RequestContext;
use crate::security::HeaderWhitelist;

/// Writable response towards the original caller.
///
/// `write_headers` stages headers, `write_status` commits them together with
/// the status, `write_body` appends bytes to a committed response.
#[async_trait]
pub trait ResponseSink: Send {
    fn write_headers(&mut self, headers: HeaderMap) -> Result<(), SinkError>;

    fn write_status(&mut self, status: StatusCode) -> Result<(), SinkError>;

    async fn write_body(&mut self, chunk: Bytes) -> Result<(), SinkError>;
}

/// Relay an upstream response to `sink`. Returns the number of body bytes
/// written.
///
/// Any failure here is [`RelayError::RelayInterrupted`]; the upstream body
/// is released when this returns.
pub async fn relay_response<S>(
    ctx: &RequestContext,
    upstream: UpstreamResponse,
    whitelist: &HeaderWhitelist,
    sink: &mut S,
) -> Result<u64, RelayError>
where
    S: ResponseSink + ?Sized,
{
    let interrupted = |bytes: u64, cause: String| RelayError::RelayInterrupted { bytes, cause };

    sink.write_headers(whitelist.filter(&upstream.headers))
        .map_err(|e| interrupted(0, e.to_string()))?;
    sink.write_status(upstream.status)
        .map_err(|e| interrupted(0, e.to_string()))?;

    let mut stream = upstream.body.into_data_stream();
    let mut written: u64 = 0;
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| interrupted(written, format!("upstream read failed: {e}")))?;
        if chunk.is_empty() {
            continue;
        }
        let len = chunk.len() as u64;
        sink.write_body(chunk)
            .await
            .map_err(|e| interrupted(written, e.to_string()))?;
        written += len;
    }

    tracing::debug!(
        request_id = %ctx.request_id,
        status = %upstream.status,
        bytes = written,
        elapsed = ?ctx.elapsed(),
        "Response relayed"
    );
    Ok(written)
}

/// Answer with a plain-text error: the error text plus a newline.
pub async fn write_error_response<S>(
    sink: &mut S,
    status: StatusCode,
    message: &str,
) -> Result<(), SinkError>
where
    S: ResponseSink + ?Sized,
{
    let mut headers = HeaderMap::new();
    headers.insert(
        CONTENT_TYPE,
        HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    headers.insert(X_CONTENT_TYPE_OPTIONS, HeaderValue::from_static("nosniff"));

    sink.write_headers(headers)?;
    sink.write_status(status)?;
    sink.write_body(Bytes::from(format!("{message}\n"))).await
}
