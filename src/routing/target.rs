//! The single upstream every request is forwarded to.

use url::Url;

use crate::error::RelayError;
use crate::routing::path::join_paths;

/// Absolute base URL of the upstream origin.
///
/// Kept as configured and parsed when a request is resolved against it, so a
/// malformed target fails every request the same way instead of aborting
/// startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForwardTarget {
    raw: String,
}

impl ForwardTarget {
    pub fn new(raw: impl Into<String>) -> Self {
        Self { raw: raw.into() }
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Parse the target into a base URL that can carry a request path.
    pub fn base_url(&self) -> Result<Url, RelayError> {
        let url = Url::parse(&self.raw).map_err(|e| self.invalid(e.to_string()))?;

        if !matches!(url.scheme(), "http" | "https") {
            return Err(self.invalid(format!("unsupported scheme {:?}", url.scheme())));
        }
        if url.cannot_be_a_base() || url.host_str().is_none() {
            return Err(self.invalid("missing host".to_string()));
        }

        Ok(url)
    }

    /// Upstream URL for `request_path`: the target with its path joined to
    /// the request path. The target's own query string is kept.
    pub fn resolve(&self, request_path: &str) -> Result<Url, RelayError> {
        let mut url = self.base_url()?;
        let path = join_paths(url.path(), request_path);
        url.set_path(&path);
        Ok(url)
    }

    fn invalid(&self, reason: String) -> RelayError {
        RelayError::Configuration {
            target: self.raw.clone(),
            reason,
        }
    }
}
