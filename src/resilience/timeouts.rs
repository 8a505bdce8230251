//! Timeout enforcement.
//!
//! # Responsibilities
//! - Wrap the upstream call with a deadline
//! - Bound every wait for the next upstream body chunk
//! - Cancel the call cleanly when the deadline passes
//!
//! # Design Decisions
//! - Uses Tokio's timeout facilities
//! - Timeout errors are distinct from transport errors
//! - Only the upstream leg is bounded; the client leg never is

use std::future::Future;
use std::time::Duration;

use futures_util::stream::{self, Stream, StreamExt};

use crate::error::{BoxError, UpstreamError};

/// Run an upstream operation, failing with [`UpstreamError::Timeout`] if it
/// does not complete within `deadline`. The operation is dropped on timeout.
pub async fn with_deadline<F, T, E>(deadline: Duration, operation: F) -> Result<T, UpstreamError>
where
    F: Future<Output = Result<T, E>>,
    E: Into<BoxError>,
{
    match tokio::time::timeout(deadline, operation).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(UpstreamError::Transport(e.into())),
        Err(_) => Err(UpstreamError::Timeout(deadline)),
    }
}

/// Fail `chunks` with [`UpstreamError::Stalled`] when no item arrives within
/// `idle` of the previous one. The stream ends after the first error.
pub fn with_idle_deadline<S, T, E>(
    idle: Duration,
    chunks: S,
) -> impl Stream<Item = Result<T, BoxError>> + Send + 'static
where
    S: Stream<Item = Result<T, E>> + Send + Unpin + 'static,
    T: Send + 'static,
    E: Into<BoxError> + Send + 'static,
{
    stream::unfold(Some(chunks), move |state| async move {
        let mut chunks = state?;
        match tokio::time::timeout(idle, chunks.next()).await {
            Ok(Some(Ok(chunk))) => Some((Ok(chunk), Some(chunks))),
            Ok(Some(Err(e))) => Some((Err(e.into()), None)),
            Ok(None) => None,
            Err(_) => Some((Err(UpstreamError::Stalled(idle).into()), None)),
        }
    })
}
