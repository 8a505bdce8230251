//! Header whitelist applied to both directions of the relay.
//!
//! # Responsibilities
//! - Hold the fixed set of header names that may cross the relay
//! - Build a filtered copy of a header map, first value only
//!
//! # Design Decisions
//! - Allow-list, not deny-list: anything unnamed is dropped, including
//!   hop-by-hop and transport headers
//! - One filter, used for the outbound request and the relayed response

use std::sync::Arc;

use axum::http::header::{HeaderMap, HeaderName, CONTENT_TYPE, USER_AGENT};

/// Session header reflected alongside the standard ones.
pub const X_SESSION_ID: HeaderName = HeaderName::from_static("x-session-id");

/// Header names reflected by default, in relay order.
pub const REFLECTED_HEADERS: [HeaderName; 3] = [CONTENT_TYPE, X_SESSION_ID, USER_AGENT];

/// Immutable, ordered set of header names eligible for relay.
///
/// Cheap to clone; the names are shared.
#[derive(Debug, Clone)]
pub struct HeaderWhitelist {
    names: Arc<[HeaderName]>,
}

impl HeaderWhitelist {
    /// Create a whitelist from header names. Duplicates are ignored.
    pub fn new(names: impl IntoIterator<Item = HeaderName>) -> Self {
        let mut unique: Vec<HeaderName> = Vec::new();
        for name in names {
            if !unique.contains(&name) {
                unique.push(name);
            }
        }
        Self {
            names: unique.into(),
        }
    }

    /// The whitelisted names, in order.
    pub fn names(&self) -> &[HeaderName] {
        &self.names
    }

    pub fn contains(&self, name: &HeaderName) -> bool {
        self.names.contains(name)
    }

    /// Copy whitelisted headers from `source`.
    ///
    /// For each whitelisted name the first value is copied when it is
    /// present and non-empty. Repeated values beyond the first are dropped.
    pub fn filter(&self, source: &HeaderMap) -> HeaderMap {
        let mut filtered = HeaderMap::with_capacity(self.names.len());
        for name in self.names.iter() {
            if let Some(value) = source.get(name) {
                if !value.is_empty() {
                    filtered.insert(name.clone(), value.clone());
                }
            }
        }
        filtered
    }
}

impl Default for HeaderWhitelist {
    fn default() -> Self {
        Self::new(REFLECTED_HEADERS)
    }
}
