//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request path
//!     → target.rs (parse the configured upstream base URL)
//!     → path.rs (join base path and request path)
//!     → Upstream URL
//! ```
//!
//! # Design Decisions
//! - A single fixed upstream; every method and path maps onto it
//! - Deterministic: the same path always yields the same URL
//! - The inbound query string is not forwarded

pub mod path;
pub mod target;

pub use path::join_paths;
pub use target::ForwardTarget;
