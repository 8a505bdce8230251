//! Structured logging.
//!
//! # Responsibilities
//! - Initialize the logging subsystem
//! - Provide the "report operational error" capability used by the relay
//!
//! # Design Decisions
//! - Uses the tracing crate for structured logging
//! - JSON format for production, pretty format for development
//! - Log level configurable via config; `RUST_LOG` wins when set

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::{LogFormat, ObservabilityConfig};
use crate::error::RelayError;
use crate::http::request::RequestContext;

/// Install the global tracing subscriber.
pub fn init_logging(config: &ObservabilityConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        format!(
            "reflect_proxy={level},tower_http={level}",
            level = config.log_level
        )
        .into()
    });

    let registry = tracing_subscriber::registry().with(filter);
    match config.log_format {
        LogFormat::Pretty => registry.with(tracing_subscriber::fmt::layer()).init(),
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json())
            .init(),
    }
}

/// Sink for operational errors raised while relaying a request.
pub trait ErrorReporter: Send + Sync {
    fn report(&self, ctx: &RequestContext, error: &RelayError);
}

/// Reports errors as `tracing` events.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingReporter;

impl ErrorReporter for TracingReporter {
    fn report(&self, ctx: &RequestContext, error: &RelayError) {
        tracing::error!(
            request_id = %ctx.request_id,
            method = %ctx.method,
            path = %ctx.path,
            kind = error.kind(),
            elapsed = ?ctx.elapsed(),
            error = %error,
            "Relay failed"
        );
    }
}
