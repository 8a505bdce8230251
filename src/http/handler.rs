//! Per-request relay orchestration.
//!
//! ```text
//! IncomingRequest
//!     → transform_request  ── ConfigurationError ──→ 500 + report
//!     → Forwarder::forward ── UpstreamUnavailable ─→ 500 + report
//!     → relay_response     ── RelayInterrupted ────→ report only
//! ```
//!
//! No step is retried; every failure ends the request.

use std::sync::Arc;
use std::time::Duration;

use crate::config::ProxyConfig;
use crate::error::RelayError;
use crate::http::client::{Forwarder, NetworkExecutor};
use crate::http::request::{transform_request, IncomingRequest, RequestContext};
use crate::http::response::{relay_response, write_error_response, ResponseSink};
use crate::observability::ErrorReporter;
use crate::routing::ForwardTarget;
use crate::security::HeaderWhitelist;

/// Process-wide relay settings. Built once at startup, read-only afterwards.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub target: ForwardTarget,
    pub whitelist: HeaderWhitelist,
    pub timeout: Duration,
}

impl RelayConfig {
    pub fn new(target: ForwardTarget, timeout: Duration) -> Self {
        Self {
            target,
            whitelist: HeaderWhitelist::default(),
            timeout,
        }
    }
}

impl From<&ProxyConfig> for RelayConfig {
    fn from(config: &ProxyConfig) -> Self {
        Self::new(
            ForwardTarget::new(config.upstream.forward_url.clone()),
            config.upstream.timeout(),
        )
    }
}

/// Handles one inbound request end to end.
pub struct Handler {
    config: Arc<RelayConfig>,
    forwarder: Forwarder,
    reporter: Arc<dyn ErrorReporter>,
}

impl Handler {
    pub fn new(
        config: RelayConfig,
        executor: Arc<dyn NetworkExecutor>,
        reporter: Arc<dyn ErrorReporter>,
    ) -> Self {
        let forwarder = Forwarder::new(executor, config.timeout);
        Self {
            config: Arc::new(config),
            forwarder,
            reporter,
        }
    }

    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    /// Relay `incoming` to the upstream and its answer to `sink`.
    ///
    /// Failures are reported and, when nothing has been committed yet,
    /// answered with a server error carrying the error text.
    pub async fn handle<S>(&self, ctx: &RequestContext, incoming: IncomingRequest, sink: &mut S)
    where
        S: ResponseSink + ?Sized,
    {
        if let Err(error) = self.relay(ctx, incoming, sink).await {
            self.reporter.report(ctx, &error);
            if let Some(status) = error.status_code() {
                if let Err(e) = write_error_response(sink, status, &error.to_string()).await {
                    tracing::debug!(
                        request_id = %ctx.request_id,
                        error = %e,
                        "Client gone before error response was written"
                    );
                }
            }
        }
    }

    async fn relay<S>(
        &self,
        ctx: &RequestContext,
        incoming: IncomingRequest,
        sink: &mut S,
    ) -> Result<u64, RelayError>
    where
        S: ResponseSink + ?Sized,
    {
        let outbound =
            transform_request(ctx, incoming, &self.config.target, &self.config.whitelist)?;
        let upstream = self.forwarder.forward(ctx, outbound).await?;
        relay_response(ctx, upstream, &self.config.whitelist, sink).await
    }
}

impl std::fmt::Debug for Handler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Handler")
            .field("config", &self.config)
            .field("forwarder", &self.forwarder)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BoxError;
    use crate::http::client::UpstreamResponse;
    use crate::http::request::OutboundRequest;
    use crate::http::response::testing::RecordingSink;
    use async_trait::async_trait;
    use axum::body::{Body, Bytes};
    use axum::http::header::{CONTENT_TYPE, USER_AGENT};
    use axum::http::{HeaderMap, HeaderValue, Method, StatusCode};
    use futures_util::{stream, StreamExt};
    use std::io;
    use std::sync::Mutex;
    use std::time::Instant;

    /// Records reported errors as `kind: message`.
    #[derive(Default)]
    struct Recorder(Mutex<Vec<String>>);

    impl Recorder {
        fn reports(&self) -> Vec<String> {
            self.0.lock().unwrap().clone()
        }
    }

    impl ErrorReporter for Recorder {
        fn report(&self, _ctx: &RequestContext, error: &RelayError) {
            self.0
                .lock()
                .unwrap()
                .push(format!("{}: {}", error.kind(), error));
        }
    }

    /// Echoes the request it received: the URL as `x-session-id`, the
    /// forwarded header names joined in the body.
    struct Inspect;

    #[async_trait]
    impl NetworkExecutor for Inspect {
        async fn execute(&self, request: OutboundRequest) -> Result<UpstreamResponse, BoxError> {
            let names: Vec<&str> = request.headers.keys().map(|k| k.as_str()).collect();
            let mut headers = HeaderMap::new();
            headers.insert("x-session-id", HeaderValue::from_str(request.url.as_str())?);
            headers.insert("x-upstream-only", HeaderValue::from_static("1"));
            Ok(UpstreamResponse {
                status: StatusCode::CREATED,
                headers,
                body: Body::from(names.join(",")),
            })
        }
    }

    struct Hello;

    #[async_trait]
    impl NetworkExecutor for Hello {
        async fn execute(&self, _request: OutboundRequest) -> Result<UpstreamResponse, BoxError> {
            Ok(UpstreamResponse {
                status: StatusCode::OK,
                headers: HeaderMap::new(),
                body: Body::from("hello"),
            })
        }
    }

    struct Slow;

    #[async_trait]
    impl NetworkExecutor for Slow {
        async fn execute(&self, _request: OutboundRequest) -> Result<UpstreamResponse, BoxError> {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Err("unreachable".into())
        }
    }

    struct Truncated;

    #[async_trait]
    impl NetworkExecutor for Truncated {
        async fn execute(&self, _request: OutboundRequest) -> Result<UpstreamResponse, BoxError> {
            let chunks: Vec<Result<Bytes, io::Error>> = vec![
                Ok(Bytes::from_static(b"partial")),
                Err(io::Error::new(io::ErrorKind::UnexpectedEof, "upstream closed")),
            ];
            Ok(UpstreamResponse {
                status: StatusCode::OK,
                headers: HeaderMap::new(),
                body: Body::from_stream(stream::iter(chunks)),
            })
        }
    }

    /// Sends one chunk, then goes silent.
    struct Stalls;

    #[async_trait]
    impl NetworkExecutor for Stalls {
        async fn execute(&self, _request: OutboundRequest) -> Result<UpstreamResponse, BoxError> {
            let chunks = stream::iter(vec![Ok::<_, io::Error>(Bytes::from_static(b"first"))])
                .chain(stream::pending());
            Ok(UpstreamResponse {
                status: StatusCode::OK,
                headers: HeaderMap::new(),
                body: Body::from_stream(chunks),
            })
        }
    }

    fn handler(
        target: &str,
        timeout: Duration,
        executor: impl NetworkExecutor + 'static,
    ) -> (Handler, Arc<Recorder>) {
        let recorder = Arc::new(Recorder::default());
        let config = RelayConfig::new(ForwardTarget::new(target), timeout);
        let handler = Handler::new(config, Arc::new(executor), recorder.clone());
        (handler, recorder)
    }

    fn request(path: &str) -> IncomingRequest {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("text/plain"));
        headers.insert(USER_AGENT, HeaderValue::from_static("relay-test"));
        headers.insert("x-custom", HeaderValue::from_static("v"));
        IncomingRequest::new(Method::POST, path)
            .with_headers(headers)
            .with_body("ping")
    }

    #[tokio::test]
    async fn successful_round_trip_is_relayed_verbatim() {
        let (handler, recorder) = handler("http://upstream.test/", Duration::from_secs(1), Hello);
        let req = request("/greet");
        let ctx = req.context();
        let mut sink = RecordingSink::default();

        handler.handle(&ctx, req, &mut sink).await;

        assert_eq!(sink.status, Some(StatusCode::OK));
        assert_eq!(sink.body(), b"hello");
        assert!(recorder.reports().is_empty());
    }

    #[tokio::test]
    async fn request_is_rewritten_and_filtered_both_ways() {
        let (handler, _) = handler("http://upstream.test/base/", Duration::from_secs(1), Inspect);
        let req = request("/items");
        let ctx = req.context();
        let mut sink = RecordingSink::default();

        handler.handle(&ctx, req, &mut sink).await;

        assert_eq!(sink.status, Some(StatusCode::CREATED));
        assert_eq!(
            sink.headers.get("x-session-id").unwrap(),
            "http://upstream.test/base/items"
        );
        assert!(sink.headers.get("x-upstream-only").is_none());
        assert_eq!(sink.body(), b"content-type,user-agent");
    }

    #[tokio::test]
    async fn malformed_target_answers_every_request_with_500() {
        let (handler, recorder) = handler("not a url", Duration::from_secs(1), Hello);

        for path in ["/a", "/b"] {
            let req = request(path);
            let ctx = req.context();
            let mut sink = RecordingSink::default();

            handler.handle(&ctx, req, &mut sink).await;

            assert_eq!(sink.status, Some(StatusCode::INTERNAL_SERVER_ERROR));
            let body = String::from_utf8(sink.body()).unwrap();
            assert!(body.starts_with("invalid forward target \"not a url\""), "{body}");
            assert!(body.ends_with('\n'));
        }

        let reports = recorder.reports();
        assert_eq!(reports.len(), 2);
        assert!(reports.iter().all(|r| r.starts_with("configuration: ")));
    }

    #[tokio::test]
    async fn slow_upstream_answers_500_within_the_deadline() {
        let (handler, recorder) = handler("http://upstream.test/", Duration::from_millis(100), Slow);
        let req = request("/");
        let ctx = req.context();
        let mut sink = RecordingSink::default();
        let started = Instant::now();

        handler.handle(&ctx, req, &mut sink).await;

        assert!(started.elapsed() < Duration::from_secs(5));
        assert_eq!(sink.status, Some(StatusCode::INTERNAL_SERVER_ERROR));
        assert_eq!(
            String::from_utf8(sink.body()).unwrap(),
            "upstream unavailable: no response within 100ms\n"
        );
        assert_eq!(recorder.reports().len(), 1);
        assert!(recorder.reports()[0].starts_with("upstream_timeout"));
    }

    #[tokio::test]
    async fn interrupted_relay_is_reported_but_not_answered() {
        let (handler, recorder) = handler("http://upstream.test/", Duration::from_secs(1), Truncated);
        let req = request("/");
        let ctx = req.context();
        let mut sink = RecordingSink::default();

        handler.handle(&ctx, req, &mut sink).await;

        assert_eq!(sink.status, Some(StatusCode::OK));
        assert_eq!(sink.body(), b"partial");
        assert_eq!(recorder.reports().len(), 1);
        assert!(recorder.reports()[0].starts_with("relay_interrupted"));
    }

    #[tokio::test]
    async fn stalled_upstream_body_is_cut_off_at_the_deadline() {
        let (handler, recorder) = handler("http://upstream.test/", Duration::from_millis(100), Stalls);
        let req = request("/");
        let ctx = req.context();
        let mut sink = RecordingSink::default();
        let started = Instant::now();

        handler.handle(&ctx, req, &mut sink).await;

        assert!(started.elapsed() < Duration::from_secs(5));
        assert_eq!(sink.status, Some(StatusCode::OK));
        assert_eq!(sink.body(), b"first");
        let reports = recorder.reports();
        assert_eq!(reports.len(), 1);
        assert!(reports[0].starts_with("relay_interrupted"), "{}", reports[0]);
        assert!(reports[0].contains("after 5 bytes"), "{}", reports[0]);
        assert!(reports[0].contains("body stalled for 100ms"), "{}", reports[0]);
    }

    #[tokio::test]
    async fn client_gone_mid_body_is_interrupted() {
        let (handler, recorder) = handler("http://upstream.test/", Duration::from_secs(1), Hello);
        let req = request("/");
        let ctx = req.context();
        let mut sink = RecordingSink {
            fail_after: Some(0),
            ..Default::default()
        };

        handler.handle(&ctx, req, &mut sink).await;

        assert_eq!(sink.status, Some(StatusCode::OK));
        assert!(sink.chunks.is_empty());
        assert_eq!(
            recorder.reports(),
            vec!["relay_interrupted: relay interrupted after 0 bytes: client connection closed"]
        );
    }
}
