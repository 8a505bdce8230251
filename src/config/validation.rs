//! Configuration validation.
//!
//! Semantic checks that serde cannot express. Returns all validation errors,
//! not just the first.
//!
//! The forward URL is not checked here, not even for emptiness: a target that
//! does not parse makes the relay answer every request with a configuration
//! error instead, so the defect is visible to callers. The server logs it
//! once when it starts.

use std::net::SocketAddr;

use crate::config::schema::ProxyConfig;

/// A single semantic problem in a [`ProxyConfig`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("listener.bind_address {0:?} is not a socket address")]
    InvalidBindAddress(String),

    #[error("upstream.timeout_secs must be greater than zero")]
    ZeroTimeout,
}

/// Validate a configuration before it is accepted into the system.
pub fn validate_config(config: &ProxyConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidBindAddress(
            config.listener.bind_address.clone(),
        ));
    }

    if config.upstream.timeout_secs == 0 {
        errors.push(ValidationError::ZeroTimeout);
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
