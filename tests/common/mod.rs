//! Shared utilities for integration testing.

use std::net::SocketAddr;
use std::time::Duration;

use axum::{
    body::{Body, Bytes},
    extract::Request,
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{any, get},
    Router,
};
use futures_util::stream;
use tokio::net::TcpListener;

use reflect_proxy::http::HttpServer;
use reflect_proxy::lifecycle::Shutdown;
use reflect_proxy::ProxyConfig;

/// Chunks served by `/base/stream`.
pub const STREAM_CHUNKS: usize = 64;
/// Size of each chunk served by `/base/stream`.
pub const STREAM_CHUNK_LEN: usize = 16 * 1024;

/// Start a mock upstream on an ephemeral port.
///
/// Routes (all under `/base`):
/// - `/hello`: 200 "hello" with one whitelisted and one private header
/// - `/echo/...`: body lists the path, query, and received headers
/// - `/slow`: answers after three seconds
/// - `/stream`: chunked body of [`STREAM_CHUNKS`] chunks
/// - `/trickle`: one chunk, then nothing for a long time
/// - `/moved`: 302 to `/elsewhere`
/// - `/missing`: 404 with a body
pub async fn start_mock_upstream() -> SocketAddr {
    let app = Router::new()
        .route("/base/hello", get(hello))
        .route("/base/echo", any(echo))
        .route("/base/echo/{*rest}", any(echo))
        .route("/base/slow", get(slow))
        .route("/base/stream", get(streamed))
        .route("/base/trickle", get(trickle))
        .route("/base/moved", get(moved))
        .route("/base/missing", get(missing));

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

/// Start the relay in front of `forward_url` and return its address.
///
/// Shutdown is triggered when the returned handle is dropped.
pub async fn start_relay(forward_url: String, timeout_secs: u64) -> (SocketAddr, Shutdown) {
    let mut config = ProxyConfig::default();
    config.listener.bind_address = "127.0.0.1:0".into();
    config.upstream.forward_url = forward_url;
    config.upstream.timeout_secs = timeout_secs;

    let listener = TcpListener::bind(&config.listener.bind_address).await.unwrap();
    let addr = listener.local_addr().unwrap();

    let shutdown = Shutdown::new();
    let server_shutdown = shutdown.subscribe();
    let server = HttpServer::new(config);
    tokio::spawn(async move {
        let _ = server.run(listener, server_shutdown).await;
    });

    (addr, shutdown)
}

/// Client that neither follows redirects nor honours proxy variables.
pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .no_proxy()
        .build()
        .unwrap()
}

async fn hello() -> Response {
    (
        [
            (header::CONTENT_TYPE, "text/plain"),
            (header::HeaderName::from_static("x-session-id"), "upstream-session"),
            (header::HeaderName::from_static("x-upstream-secret"), "s3cr3t"),
            (header::SERVER, "mock"),
        ],
        "hello",
    )
        .into_response()
}

async fn echo(request: Request) -> String {
    let uri = request.uri();
    let mut lines = vec![
        format!("method={}", request.method()),
        format!("path={}", uri.path()),
        format!("query={}", uri.query().unwrap_or("")),
    ];
    lines.extend(header_lines(request.headers()));
    let body = axum::body::to_bytes(request.into_body(), usize::MAX)
        .await
        .unwrap();
    lines.push(format!("body={}", String::from_utf8_lossy(&body)));
    lines.join("\n")
}

fn header_lines(headers: &HeaderMap) -> Vec<String> {
    let mut lines: Vec<String> = headers
        .iter()
        .map(|(name, value)| format!("header:{}={}", name, value.to_str().unwrap_or("?")))
        .collect();
    lines.sort();
    lines
}

async fn slow() -> &'static str {
    tokio::time::sleep(Duration::from_secs(3)).await;
    "too late"
}

async fn streamed() -> Response {
    let chunks = stream::iter(
        (0..STREAM_CHUNKS)
            .map(|i| Ok::<_, std::convert::Infallible>(Bytes::from(vec![b'a' + (i % 26) as u8; STREAM_CHUNK_LEN]))),
    );
    Response::builder()
        .header(header::CONTENT_TYPE, "application/octet-stream")
        .body(Body::from_stream(chunks))
        .unwrap()
}

async fn trickle() -> Response {
    let chunks = stream::unfold(0u8, |sent| async move {
        match sent {
            0 => Some((Ok::<_, std::convert::Infallible>(Bytes::from_static(b"first")), 1)),
            _ => {
                tokio::time::sleep(Duration::from_secs(30)).await;
                None
            }
        }
    });
    Response::builder()
        .header(header::CONTENT_TYPE, "text/plain")
        .body(Body::from_stream(chunks))
        .unwrap()
}

async fn moved() -> Response {
    (StatusCode::FOUND, [(header::LOCATION, "/elsewhere")]).into_response()
}

async fn missing() -> Response {
    (StatusCode::NOT_FOUND, [(header::CONTENT_TYPE, "text/plain")], "no such thing").into_response()
}
