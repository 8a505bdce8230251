//! Single-upstream HTTP forwarding relay library.

pub mod config;
pub mod error;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod resilience;
pub mod routing;
pub mod security;

pub use config::schema::ProxyConfig;
pub use error::RelayError;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
