//! Error types for the relay pipeline.
//!
//! Every failure is terminal for the request that produced it. The first two
//! variants of [`RelayError`] happen before anything is sent to the client and
//! become a 500 response; [`RelayError::RelayInterrupted`] happens after the
//! status line is committed and can only be reported.

use std::time::Duration;

use axum::http::StatusCode;

/// Boxed error used for causes coming from the network layer.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Failure of a single relayed request.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    /// The forward target cannot be turned into an upstream URL.
    #[error("invalid forward target {target:?}: {reason}")]
    Configuration { target: String, reason: String },

    /// The upstream could not be reached, or did not answer in time.
    #[error("upstream unavailable: {0}")]
    UpstreamUnavailable(#[from] UpstreamError),

    /// The body copy failed after status and headers were committed.
    #[error("relay interrupted after {bytes} bytes: {cause}")]
    RelayInterrupted { bytes: u64, cause: String },
}

impl RelayError {
    /// Short label used as a structured log field.
    pub fn kind(&self) -> &'static str {
        match self {
            RelayError::Configuration { .. } => "configuration",
            RelayError::UpstreamUnavailable(UpstreamError::Timeout(_)) => "upstream_timeout",
            RelayError::UpstreamUnavailable(UpstreamError::Stalled(_)) => "upstream_stalled",
            RelayError::UpstreamUnavailable(UpstreamError::Transport(_)) => "upstream_transport",
            RelayError::RelayInterrupted { .. } => "relay_interrupted",
        }
    }

    /// Status sent to the client for failures that happen before the relay
    /// starts. `None` once the response is already committed.
    pub fn status_code(&self) -> Option<StatusCode> {
        match self {
            RelayError::Configuration { .. } | RelayError::UpstreamUnavailable(_) => {
                Some(StatusCode::INTERNAL_SERVER_ERROR)
            }
            RelayError::RelayInterrupted { .. } => None,
        }
    }
}

/// Cause of an [`RelayError::UpstreamUnavailable`], or of an upstream body
/// read that failed mid-relay.
#[derive(Debug, thiserror::Error)]
pub enum UpstreamError {
    #[error("no response within {0:?}")]
    Timeout(Duration),

    #[error("body stalled for {0:?}")]
    Stalled(Duration),

    #[error("{0}")]
    Transport(BoxError),
}

/// Failure of a [`ResponseSink`](crate::http::response::ResponseSink) step.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SinkError {
    #[error("response already committed")]
    AlreadyCommitted,

    #[error("response not committed yet")]
    NotCommitted,

    #[error("client connection closed")]
    Closed,
}
