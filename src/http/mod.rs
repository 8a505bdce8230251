//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! Client request
//!     → server.rs (Axum setup, spawn relay task)
//!     → handler.rs (orchestration, error translation)
//!     → request.rs (rewrite URL, filter headers)
//!     → client.rs (bounded round trip to the upstream)
//!     → response.rs (relay status, filtered headers, streamed body)
//!     → Send to client
//! ```

pub mod client;
pub mod handler;
pub mod request;
pub mod response;
pub mod server;

pub use client::{Forwarder, HyperExecutor, NetworkExecutor, UpstreamResponse};
pub use handler::{Handler, RelayConfig};
pub use request::{transform_request, IncomingRequest, OutboundRequest, RequestContext, RequestId};
pub use response::{relay_response, write_error_response, ResponseSink};
pub use server::{ChannelSink, HttpServer};
