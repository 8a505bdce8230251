//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request headers
//!     → headers.rs (whitelist filter)
//!     → Outbound request to upstream
//!
//! Upstream response headers
//!     → headers.rs (same whitelist filter)
//!     → Relayed response to client
//! ```
//!
//! # Design Decisions
//! - Fail closed: a header is relayed only if it is explicitly named
//! - No trust in client or upstream input

pub mod headers;

pub use headers::{HeaderWhitelist, REFLECTED_HEADERS, X_SESSION_ID};
