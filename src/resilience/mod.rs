//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Request to upstream:
//!     → timeouts.rs (enforce the upstream deadline on the head and
//!       between body chunks)
//!     → On failure: terminal for the request, reported once
//! ```
//!
//! # Design Decisions
//! - Timeouts are non-negotiable; the upstream call always has a deadline
//! - No retries: every failure is handled once

pub mod timeouts;

pub use timeouts::{with_deadline, with_idle_deadline};
