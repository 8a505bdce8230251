//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create the Axum Router mapping every method and path to the relay
//! - Wire up middleware (tracing)
//! - Bind server to listener, shut down gracefully
//! - Adapt the relay's sink protocol to a streaming Axum response

use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    body::{Body, Bytes},
    extract::{Request, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::any,
    Router,
};
use futures_util::stream;
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc, oneshot};
use tower_http::trace::TraceLayer;
use tracing::Instrument;

use crate::config::ProxyConfig;
use crate::error::SinkError;
use crate::http::client::{HyperExecutor, NetworkExecutor};
use crate::http::handler::{Handler, RelayConfig};
use crate::http::request::IncomingRequest;
use crate::http::response::ResponseSink;
use crate::observability::{ErrorReporter, TracingReporter};

/// Body chunks buffered between the relay task and the client connection.
const RELAY_CHANNEL_CAPACITY: usize = 8;

type BodyChunk = Result<Bytes, std::convert::Infallible>;

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub handler: Arc<Handler>,
}

/// HTTP server for the relay.
pub struct HttpServer {
    router: Router,
    config: ProxyConfig,
}

impl HttpServer {
    /// Create a server relaying through the default `hyper` executor.
    pub fn new(config: ProxyConfig) -> Self {
        Self::with_executor(
            config,
            Arc::new(HyperExecutor::new()),
            Arc::new(TracingReporter),
        )
    }

    /// Create a server with an explicit network executor and error reporter.
    pub fn with_executor(
        config: ProxyConfig,
        executor: Arc<dyn NetworkExecutor>,
        reporter: Arc<dyn ErrorReporter>,
    ) -> Self {
        let relay_config = RelayConfig::from(&config);
        tracing::info!(
            forward_url = %relay_config.target.as_str(),
            timeout = ?relay_config.timeout,
            reflected_headers = ?relay_config.whitelist.names(),
            "Relay configured"
        );
        if let Err(e) = relay_config.target.base_url() {
            tracing::warn!(error = %e, "Every request will fail until the forward URL is fixed");
        }

        let handler = Arc::new(Handler::new(relay_config, executor, reporter));
        let router = Self::build_router(AppState { handler });
        Self { router, config }
    }

    /// Build the Axum router with all middleware layers.
    fn build_router(state: AppState) -> Router {
        Router::new()
            .route("/", any(relay_handler))
            .route("/{*path}", any(relay_handler))
            .with_state(state)
            .layer(TraceLayer::new_for_http())
    }

    /// The configured router, for serving it on a custom transport.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Run the server until `shutdown` fires.
    pub async fn run(
        self,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        axum::serve(listener, self.router)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("Shutdown signal received");
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }

    /// Get a reference to the config.
    pub fn config(&self) -> &ProxyConfig {
        &self.config
    }
}

/// Entry point for every inbound request.
///
/// The relay runs on its own task writing into a [`ChannelSink`]; this
/// handler returns as soon as the response head is committed and the body
/// keeps streaming from the task.
async fn relay_handler(State(state): State<AppState>, request: Request) -> Response {
    let incoming = IncomingRequest::from(request);
    let ctx = incoming.context();
    let span = tracing::info_span!(
        "relay",
        request_id = %ctx.request_id,
        method = %ctx.method,
        path = %ctx.path,
    );

    let (mut sink, head) = ChannelSink::open();
    let handler = state.handler.clone();
    tokio::spawn(
        async move {
            handler.handle(&ctx, incoming, &mut sink).await;
        }
        .instrument(span),
    );

    match head.await {
        Ok(response) => response,
        Err(_) => (StatusCode::INTERNAL_SERVER_ERROR, "relay ended without a response\n")
            .into_response(),
    }
}

/// [`ResponseSink`] that hands the committed head to the waiting Axum
/// handler and streams body chunks through a bounded channel.
///
/// Dropping the sink ends the response body.
pub struct ChannelSink {
    headers: HeaderMap,
    head_tx: Option<oneshot::Sender<Response>>,
    body_tx: Option<mpsc::Sender<BodyChunk>>,
}

impl ChannelSink {
    pub fn open() -> (Self, oneshot::Receiver<Response>) {
        let (head_tx, head_rx) = oneshot::channel();
        let sink = Self {
            headers: HeaderMap::new(),
            head_tx: Some(head_tx),
            body_tx: None,
        };
        (sink, head_rx)
    }
}

#[async_trait]
impl ResponseSink for ChannelSink {
    fn write_headers(&mut self, headers: HeaderMap) -> Result<(), SinkError> {
        if self.head_tx.is_none() {
            return Err(SinkError::AlreadyCommitted);
        }
        self.headers = headers;
        Ok(())
    }

    fn write_status(&mut self, status: StatusCode) -> Result<(), SinkError> {
        let head_tx = self.head_tx.take().ok_or(SinkError::AlreadyCommitted)?;

        let (body_tx, body_rx) = mpsc::channel::<BodyChunk>(RELAY_CHANNEL_CAPACITY);
        let body = Body::from_stream(stream::unfold(body_rx, |mut rx| async move {
            rx.recv().await.map(|chunk| (chunk, rx))
        }));

        let mut response = Response::new(body);
        *response.status_mut() = status;
        *response.headers_mut() = std::mem::take(&mut self.headers);

        head_tx.send(response).map_err(|_| SinkError::Closed)?;
        self.body_tx = Some(body_tx);
        Ok(())
    }

    async fn write_body(&mut self, chunk: Bytes) -> Result<(), SinkError> {
        let body_tx = self.body_tx.as_ref().ok_or(SinkError::NotCommitted)?;
        body_tx.send(Ok(chunk)).await.map_err(|_| SinkError::Closed)
    }
}
