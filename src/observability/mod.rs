//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → logging.rs (structured log events)
//!
//! Relay failures:
//!     → ErrorReporter::report (one call per failed request)
//!
//! Consumers:
//!     → Log aggregation (stdout, pretty or JSON)
//! ```
//!
//! # Design Decisions
//! - Structured logging (JSON) for machine parsing
//! - Request ID flows through all subsystems

pub mod logging;

pub use logging::{init_logging, ErrorReporter, TracingReporter};
